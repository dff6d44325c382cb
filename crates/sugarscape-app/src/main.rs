use anyhow::Result;
use std::fs::File;
use std::io::BufWriter;
use sugarscape_app::WealthRecorder;
use sugarscape_core::{SugarScapeConfig, WorldState};
use tracing::info;

const DEFAULT_STEPS: u64 = 500;
const OUTPUT_PATH: &str = "wealth_samples.jsonl";

fn main() -> Result<()> {
    init_tracing();
    let steps = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<u64>().ok())
        .unwrap_or(DEFAULT_STEPS);

    let config = SugarScapeConfig {
        rng_seed: Some(0x5AC5_CAFE),
        ..SugarScapeConfig::default()
    };
    info!(
        width = config.width,
        height = config.height,
        population = config.population,
        steps,
        "starting SugarScape run"
    );

    let recorder = WealthRecorder::new();
    let mut world = WorldState::with_observer(config, Box::new(recorder.clone()))?;

    for _ in 0..steps {
        let summary = world.step();
        if summary.tick.0.is_multiple_of(100) {
            info!(
                tick = summary.tick.0,
                population = summary.population,
                deaths = summary.deaths,
                mean_wealth = summary.mean_wealth,
                total_sugar = summary.total_sugar,
                "progress"
            );
        }
    }

    if let Some(summary) = world.history().last() {
        info!(
            tick = summary.tick.0,
            population = summary.population,
            total_wealth = summary.total_wealth,
            mean_wealth = summary.mean_wealth,
            "run complete"
        );
    }

    let file = File::create(OUTPUT_PATH)?;
    let mut writer = BufWriter::new(file);
    recorder.write_json_lines(&mut writer)?;
    info!(samples = recorder.len(), path = OUTPUT_PATH, "wrote wealth samples");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
