use clap::Parser;
use std::error::Error;
use std::io::{self, Read};

use termvid::cli::{handle_config_action, select_streams, stdin_spec, Args, Command};
use termvid::config::Config;
use termvid::session::{restore_terminal, run_pipeline, Session, SessionSummary};
use termvid::CancelToken;

/// Cancel `token` on Ctrl+C.
///
/// ffmpeg children share our process group and get the same SIGINT, so
/// their streams close and blocked render loops wake up.
fn setup_ctrlc_handler(token: CancelToken) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, shutting down");
        token.cancel();
    })
}

fn log_summary(summary: &SessionSummary) {
    for (label, report) in &summary.streams {
        log::info!("[{}] {} frames, {}", label, report.frames, report.exit);
    }
    log::info!("{} writes to the terminal", summary.frames_written);
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    match args.command {
        Some(Command::Config { ref action }) => {
            handle_config_action(action.clone(), args.config.as_deref())
        }
        Some(Command::Stdin) => {
            let spec = stdin_spec(&args)?;
            let cancel = CancelToken::new();
            setup_ctrlc_handler(cancel.clone())?;

            let input: Box<dyn Read + Send> = Box::new(io::stdin());
            let (summary, mut stdout) = run_pipeline(vec![(spec, input)], cancel, io::stdout())?;
            restore_terminal(&mut stdout)?;
            log_summary(&summary);
            Ok(())
        }
        _ => {
            let config = Config::load(args.config.as_deref())?;
            let streams = select_streams(&args, &config);
            let session = Session::new(config.ffmpeg.binary.clone(), streams)?;
            setup_ctrlc_handler(session.cancel_token())?;

            let summary = session.run()?;
            log_summary(&summary);
            Ok(())
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
