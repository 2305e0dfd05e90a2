use pongrelay::{init_tracing, RelayConfig, Runner};

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            let cause = format!("{err:#}");
            tracing::error!(error = %cause, "invalid configuration");
            std::process::exit(1);
        }
    };

    let runner = match Runner::from_config(config) {
        Ok(runner) => runner,
        Err(err) => {
            let cause = format!("{err:#}");
            tracing::error!(error = %cause, "failed to assemble pipeline");
            std::process::exit(1);
        }
    };

    if let Err(err) = runner.run_until_ctrl_c().await {
        let cause = format!("{err:#}");
        tracing::error!(error = %cause, "pipeline terminated");
        std::process::exit(1);
    }
}
