use rand::Rng;
use std::time::Duration;

/// Format an offset in seconds as `HH:MM:SS`
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Scale `base` by a random factor drawn from `[low, high]`
pub fn jitter(base: Duration, low: f64, high: f64) -> Duration {
    if base.is_zero() || low >= high {
        return base.mul_f64(low.max(0.0));
    }
    let factor = rand::thread_rng().gen_range(low..=high);
    base.mul_f64(factor)
}

/// Hide all but the last four characters of a secret
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let visible: String = secret.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), visible)
}

/// Check if the current environment has the external tools a run needs
pub async fn check_dependencies(yt_dlp_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp_path).await {
        missing.push(format!(
            "{} - required by the transcript-service and audio strategies",
            yt_dlp_path
        ));
    }

    // yt-dlp needs ffmpeg to convert downloads to mp3/m4a
    if !check_command_available("ffmpeg").await {
        missing.push("ffmpeg - required for audio extraction".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
