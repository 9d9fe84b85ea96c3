use hot_module_host::abi::Primitives;
use hot_module_host::{backend, DylibLoader, Host, HostConfig, HostError};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let code = match run() {
        Ok(()) => 0,
        Err(err) => {
            log::error!("{err}");
            err.exit_code()
        }
    };
    log::info!("exiting with code {code}");
    std::process::exit(code);
}

fn run() -> Result<(), HostError> {
    let config = HostConfig::from_args()?;
    log::debug!("{config:?}");

    let primitives = backend::console_primitives(config.tick_rate);
    // The surface belongs to the host and outlives every module instance.
    let surface = Primitives::new(primitives);
    surface.surface_init(
        config.surface_width,
        config.surface_height,
        &config.surface_title,
    );

    let result = Host::new(DylibLoader, primitives, &config).and_then(|mut host| host.run());
    surface.surface_close();

    let summary = result?;
    log::info!("ran {} ticks with {} reloads", summary.ticks, summary.reloads);
    Ok(())
}
