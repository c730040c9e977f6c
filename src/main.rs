use respd::{log_error, StartupConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = match StartupConfig::from_args() {
        Ok(config) => config,
        Err(e) => {
            log_error!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = respd::run(config).await {
        log_error!("{e:?}");
        std::process::exit(1);
    }
}
