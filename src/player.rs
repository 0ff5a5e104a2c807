use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};

use crate::config::PlayerConfig;

const URL_PLACEHOLDER: &str = "%URL%";

/// Builds the external player invocation from the configured command
/// template. `%URL%` tokens are replaced with the clip URL; if the template
/// never mentions it, the URL is appended as the final argument.
pub fn build_command(template: &[String], url: &str) -> Result<Vec<String>> {
    if template.is_empty() {
        bail!("player: video command not configured");
    }
    if url.trim().is_empty() {
        bail!("player: clip url required");
    }

    let mut args: Vec<String> = Vec::with_capacity(template.len() + 1);
    let mut substituted = false;
    for part in template {
        if part.contains(URL_PLACEHOLDER) {
            args.push(part.replace(URL_PLACEHOLDER, url));
            substituted = true;
        } else {
            args.push(part.clone());
        }
    }
    if !substituted {
        args.push(url.to_string());
    }
    Ok(args)
}

/// Launches the configured player for a clip. Detached players keep running
/// after clipdeck exits; attached ones block until the player closes.
pub fn launch(cfg: &PlayerConfig, url: &str) -> Result<()> {
    let args = build_command(&cfg.video_command, url)?;
    let Some((program, rest)) = args.split_first() else {
        bail!("player: video command not configured");
    };

    let mut command = Command::new(program);
    command.args(rest);

    if cfg.video_detach {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
            .spawn()
            .with_context(|| format!("player: launch {}", program))?;
        Ok(())
    } else {
        let status = command
            .status()
            .with_context(|| format!("player: run {}", program))?;
        if !status.success() {
            bail!("player: {} exited with {}", program, status);
        }
        Ok(())
    }
}

/// Opens the post's web page in the default browser.
pub fn open_in_browser(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        bail!("player: post url required");
    }
    webbrowser::open(url).context("player: open browser")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_url_placeholder() {
        let template = vec!["mpv".to_string(), "--fs".to_string(), "%URL%".to_string()];
        let args = build_command(&template, "https://cdn.example/clip.mp4").unwrap();
        assert_eq!(args, vec!["mpv", "--fs", "https://cdn.example/clip.mp4"]);
    }

    #[test]
    fn appends_url_when_no_placeholder() {
        let template = vec!["vlc".to_string()];
        let args = build_command(&template, "https://cdn.example/clip.mp4").unwrap();
        assert_eq!(args, vec!["vlc", "https://cdn.example/clip.mp4"]);
    }

    #[test]
    fn placeholder_inside_argument_is_replaced() {
        let template = vec!["mpv".to_string(), "--playlist=%URL%".to_string()];
        let args = build_command(&template, "https://x/clip.mp4").unwrap();
        assert_eq!(args[1], "--playlist=https://x/clip.mp4");
    }

    #[test]
    fn rejects_empty_template_or_url() {
        assert!(build_command(&[], "https://x").is_err());
        assert!(build_command(&["mpv".to_string()], "  ").is_err());
    }
}
