use std::{error::Error, fs, path::Path};

use birl::{
    algo::{Birl, BirlConfig, PolicyIteration, PolicyIterationConfig},
    gym::GridWorld,
    loss::{Loss, PolicyDistance, PolicyLoss, RewardLoss},
    prob::GaussianRewardPrior,
    trajectory::TrajectorySampler,
};

const SEED: u64 = 42;
const NUM_DEMOS: usize = 150;
const HORIZON: usize = 50;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let path = Path::new("demos/gridworld_birl");
    let world: GridWorld = fs::read_to_string(path.join("maps/map_a.txt"))?.parse()?;

    let mut w_expert = vec![-0.01, -3.0, 1.0];
    let range = w_expert.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        - w_expert.iter().copied().fold(f64::INFINITY, f64::min);
    w_expert.iter_mut().for_each(|w| *w /= range);

    let mdp = world.mdp(w_expert.clone(), 1.0, 0.9, 0.1)?;

    let planner_config = PolicyIterationConfig {
        seed: Some(SEED),
        ..Default::default()
    };
    let planner = PolicyIteration::new(planner_config.clone());
    let plan = planner.solve(&mdp)?;

    let demos = TrajectorySampler::new(HORIZON, NUM_DEMOS)
        .with_start(world.start_distribution())
        .with_seed(SEED)
        .sample(&mdp, &plan.policy)?;

    // IRL

    let prior = GaussianRewardPrior::new(mdp.dimension(), 0.0, 0.15)?;
    let birl = Birl::new(
        prior,
        BirlConfig {
            beta: 0.8,
            delta: 0.2,
            max_iter: 1000,
            burn_ratio: 0.3,
            planner: planner_config,
            seed: Some(SEED),
            ..Default::default()
        },
    );
    let trace = birl.solve(&mdp, &demos)?;

    fs::create_dir_all(path.join("out"))?;
    trace.save(path.join("out/pw_trace.csv"))?;

    let r = trace.last().ok_or("empty trace")?.r_mean.clone();
    let r_plan = planner.solve(&mdp.with_weights(&r)?)?;
    println!("Found reward: {r:?}");
    println!("Acceptance rate: {:.3}", trace.acceptance_rate());
    for row in r_plan.policy.as_slice().chunks(world.cols()) {
        println!("{row:?}");
    }

    let policy_loss = PolicyLoss::new(mdp.clone(), planner, 2.0, PolicyDistance::Mismatch);
    println!(
        "Policy loss of the posterior mean: {:.4}",
        policy_loss.evaluate(&w_expert, &r)?
    );

    // Write loss curves to CSV

    let loss = RewardLoss::new(2.0);
    let mut wtr = csv::Writer::from_path(path.join("out/loss.csv"))?;
    wtr.write_record(["step", "loss", "loss_mean"])?;
    for record in trace.iter() {
        wtr.write_record(&[
            record.step.to_string(),
            loss.evaluate(&w_expert, &record.r)?.to_string(),
            loss.evaluate(&w_expert, &record.r_mean)?.to_string(),
        ])?;
    }
    wtr.flush()?;

    Ok(())
}
