use anyhow::Result;

use crate::command::tunnel::parse_header;
use crate::config::Config;

#[derive(Debug, clap::Args)]
pub struct Args {}

pub fn execute(_args: &Args, profile: &str) -> Result<()> {
    match Config::path() {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: unavailable (no config directory for this user)"),
    }

    let config = Config::load()?;
    let profile_config = match config.get_profile(profile) {
        Some(c) => c,
        None => {
            println!("Profile '{}' is not configured", profile);
            println!();
            println!("Add a [profile.{}] section to {:?}.", profile, Config::user_path());
            return Ok(());
        }
    };

    println!("Profile: {}", profile);
    println!("  URL:       {}", profile_config.url.as_deref().unwrap_or("(not set)"));
    println!(
        "  Bind host: {}",
        profile_config.bind_host.as_deref().unwrap_or(relayport::config::DEFAULT_BIND_HOST)
    );
    for raw in &profile_config.headers {
        match parse_header(raw) {
            Ok((name, _)) => println!("  Header:    {}: ***", name),
            Err(e) => println!("  Header:    invalid ({})", e),
        }
    }

    Ok(())
}
