use obs_remote_control::config::Config;
use obs_remote_control::{ClientBuilder, EventFilter, ObsClient, SessionState};
use std::time::Duration;

const DEMO_RECORDING: Duration = Duration::from_secs(5);

const USAGE: &str = "usage: obs-remote [demo|version|auth-info|record-start|record-stop|stream-start|stream-stop|set-scene <name>|set-profile <name>|events [type]|config-init]";

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "demo".to_string());

    if command == "config-init" {
        return handle_config_init();
    }
    if command == "help" || command == "--help" {
        println!("{USAGE}");
        return Ok(());
    }

    let config = Config::load()?;
    let client = ClientBuilder::from_config(&config.obs).build()?;
    client.connect().await?;

    let result = tokio::select! {
        res = dispatch(&client, &command, args.next()) => res,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("shutdown: ctrl-c");
            Ok(())
        }
    };
    client.close().await;
    result
}

async fn dispatch(
    client: &ObsClient,
    command: &str,
    arg: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        "demo" => handle_demo(client).await,
        "version" => {
            let version = client.get_version().await?;
            println!("{}", serde_json::to_string_pretty(&version)?);
            Ok(())
        }
        "auth-info" => {
            let info = client.get_auth_info().await?;
            println!("auth required: {}", info.auth_required);
            Ok(())
        }
        "record-start" => Ok(client.start_recording().await?),
        "record-stop" => Ok(client.stop_recording().await?),
        "stream-start" => Ok(client.start_streaming().await?),
        "stream-stop" => Ok(client.stop_streaming().await?),
        "set-scene" => {
            let scene = arg.ok_or("missing scene name (usage: set-scene <name>)")?;
            Ok(client.set_current_scene(&scene).await?)
        }
        "set-profile" => {
            let profile = arg.ok_or("missing profile name (usage: set-profile <name>)")?;
            Ok(client.set_current_profile(&profile).await?)
        }
        "events" => handle_events(client, arg).await,
        other => Err(format!("unknown command {other:?}\n{USAGE}").into()),
    }
}

async fn handle_demo(client: &ObsClient) -> Result<(), Box<dyn std::error::Error>> {
    let version = client.get_version().await?;
    println!(
        "Version info: {} Plugin: {}",
        version.obs_studio_version, version.obs_websocket_version
    );
    client.start_recording().await?;
    tokio::time::sleep(DEMO_RECORDING).await;
    client.stop_recording().await?;
    Ok(())
}

async fn handle_events(
    client: &ObsClient,
    event_type: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match event_type {
        Some(t) => EventFilter::Type(t),
        None => EventFilter::All,
    };
    let mut events = client.subscribe(filter);
    let mut states = client.state_changes();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!(
                    "{} {}",
                    event.event_type,
                    serde_json::to_string(&event.payload)?
                ),
                None => return Ok(()),
            },
            changed = states.changed() => {
                if changed.is_err() || *states.borrow() == SessionState::Disconnected {
                    return Err("connection to obs closed".into());
                }
            }
        }
    }
}

fn handle_config_init() -> Result<(), Box<dyn std::error::Error>> {
    let path = Config::default_path();
    Config::write_default(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
