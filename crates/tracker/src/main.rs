use std::{env, time::Duration};

use backend_api::{ApiConfig, HttpBackend, SseTransport};
use map_session::{
    config::SessionConfig,
    runtime::{self, SessionClosed, SessionHandle},
    session::{Command, MapSession},
    stream::PositionStreamClient,
};
use tokio::io::{AsyncBufReadExt, BufReader};

mod console;

use console::Input;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() {
    env_logger::init();

    // configuration
    let api_config = ApiConfig::from_env().expect("expected valid tracker configuration in env.");
    let session_config = match env::var("TRACKER_SESSION_CONFIG") {
        Ok(path) => SessionConfig::from_json_file(&path)
            .unwrap_or_else(|why| panic!("could not read session config {path}: {why}")),
        Err(_) => SessionConfig::default(),
    };

    // session
    let backend = HttpBackend::new(api_config.clone()).expect("could not create http client.");
    let (session, task) = runtime::spawn(MapSession::new(&session_config), backend);

    // live positions
    let transport = SseTransport::new(&api_config).expect("could not create stream client.");
    let mut stream = PositionStreamClient::new(api_config.stream_config(), transport);
    stream.activate(session.clone());

    println!("{}", console::HELP);
    if let Err(why) = run_console(&session).await {
        log::error!("{why}");
    }

    stream.deactivate().await;
    session.shutdown().await;
    if let Err(why) = task.await {
        log::error!("map session task failed: {why}");
    }
}

async fn run_console(session: &SessionHandle) -> Result<(), SessionClosed> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut poll = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => return Ok(()),
                    Err(why) => {
                        log::error!("could not read from stdin: {why}");
                        return Ok(());
                    }
                };
                match console::parse(&line) {
                    Ok(Some(Input::Command(command))) => session.command(command).await?,
                    Ok(Some(Input::Status)) => println!("{}", console::status(&session.snapshot().await?)),
                    Ok(Some(Input::Help)) => println!("{}", console::HELP),
                    Ok(Some(Input::Quit)) => return Ok(()),
                    Ok(None) => {}
                    Err(why) => println!("{why}"),
                }
            }
            _ = poll.tick() => {
                for notification in session.take_notifications().await? {
                    println!("{notification}");
                }
                // there is no animation, a requested view is reached at once
                if let Some(transition) = session.take_view_transition().await? {
                    log::debug!("view moves to {:?} in {:?}", transition.target, transition.duration);
                    session.command(Command::ViewSettled(transition.target)).await?;
                }
            }
        }
    }
}
