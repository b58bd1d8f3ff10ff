#[macro_use]
extern crate log;

use std::{fs::OpenOptions, path::Path, process::ExitCode, sync::Arc, time::Duration};

use tokio::{
    io::{stdin, stdout, BufReader},
    runtime,
};

use radsnmp::{
    configuration::{Configuration, Parser},
    controller::{Controller, Settings},
    dictionary::Dictionary,
    schema::SnmpAttributes,
    shutdown::{listen_for_signals, Shutdown},
    transport::Connection,
};

fn main() -> ExitCode {
    let conf = Configuration::parse();

    if let Err(e) = init_logging(&conf) {
        eprintln!("radsnmp: {}", e);
        return ExitCode::FAILURE;
    }

    let runtime = match runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed starting runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(run(conf));
    // A blocking stdin read cannot be cancelled; don't wait for it.
    runtime.shutdown_timeout(Duration::from_millis(100));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// stdout belongs to the agent, so logs go to stderr or the `-l` file.
fn init_logging(conf: &Configuration) -> std::io::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(conf.log_level()).parse_default_env();

    match conf.log_file.as_deref() {
        Some(path) if path != Path::new("stderr") => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        _ => {
            builder.target(env_logger::Target::Stderr);
        }
    }
    builder.init();
    Ok(())
}

async fn run(conf: Configuration) -> Result<(), Box<dyn std::error::Error>> {
    conf.validate()?;
    let secret = conf.load_secret()?;

    let mut dict = Dictionary::builtin()?;
    for dir in [&conf.dict_dir, &conf.raddb_dir].into_iter().flatten() {
        debug!("Loading dictionaries from {}", dir.display());
        dict.load_dir(dir)?;
    }
    let attrs = SnmpAttributes::resolve(&dict)?;

    let server = conf.resolve_server().await?;
    let transport = Connection::connect(conf.protocol, server)
        .await
        .map_err(|e| format!("Failed connecting to {} over {}: {}", server, conf.protocol, e))?;
    info!("Using {} server {}", conf.protocol, server);

    let shutdown = Arc::new(Shutdown::new());
    listen_for_signals(shutdown.clone())?;

    let settings = Settings {
        code: conf.command,
        server,
        secret,
        retries: conf.retries,
        timeout: conf.timeout(),
        first_id: rand::random(),
    };
    let mut controller = Controller::new(
        Arc::new(dict),
        attrs,
        settings,
        BufReader::new(stdin()),
        stdout(),
        transport,
        shutdown,
    );
    controller.run().await?;
    Ok(())
}
