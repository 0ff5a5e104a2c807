use std::env;
use std::process::ExitCode;

use semver::Version;

fn main() -> ExitCode {
    let mut args = env::args().skip(1);

    if let Some(flag) = args.next() {
        match flag.as_str() {
            "--version" | "-V" => {
                println!("clipdeck {}", clipdeck::VERSION);
                return ExitCode::SUCCESS;
            }
            "--help" | "-h" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--check-updates" => {
                return check_updates();
            }
            other => {
                eprintln!("clipdeck: unknown argument {:?}", other);
                print_help();
                return ExitCode::from(2);
            }
        }
    }

    match clipdeck::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("clipdeck: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn check_updates() -> ExitCode {
    let current = match Version::parse(clipdeck::VERSION) {
        Ok(version) => version,
        Err(err) => {
            eprintln!("clipdeck: invalid build version: {}", err);
            return ExitCode::FAILURE;
        }
    };
    match clipdeck::update::check_for_update(&current) {
        Ok(Some(info)) => {
            println!(
                "clipdeck v{} is available (you have v{}): {}",
                info.version,
                clipdeck::VERSION,
                info.release_url
            );
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!("clipdeck {} is up to date.", clipdeck::VERSION);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("clipdeck: update check failed: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!("clipdeck {} - terminal client for the Clipdeck video feed", clipdeck::VERSION);
    println!();
    println!("Usage: clipdeck [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -V, --version        Print the version and exit");
    println!("  -h, --help           Show this help");
    println!("      --check-updates  Check GitHub for a newer release");
    println!();
    println!("Keys:");
    println!("  j/k or arrows  scroll the feed");
    println!("  enter          open comments (r replies, q goes back)");
    println!("  L              show the editor leaderboard (p cycles the period)");
    println!("  u              show the author's profile");
    println!("  m              toggle audio (active clip only)");
    println!("  1 / 2          vote +1 / +2 on the selected clip");
    println!("  f              follow or unfollow the author");
    println!("  o              play the clip in the external player");
    println!("  O              open the post in a browser");
    println!("  c              cycle the category filter");
    println!("  R              refresh the feed");
    println!("  q              quit");
    println!();
    println!("Config: {}", config_hint());
}

fn config_hint() -> String {
    clipdeck::config::default_path()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "~/.config/clipdeck/config.yaml".to_string())
}
