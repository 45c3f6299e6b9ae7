/// Check if the current environment has required tools
pub async fn check_dependencies(yt_dlp_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    // Check for yt-dlp
    if !check_command_available(yt_dlp_path, "--version").await {
        missing.push(format!("{} - required for TikTok audio extraction", yt_dlp_path));
    }

    // yt-dlp shells out to ffmpeg for the mp3 conversion
    if !check_command_available("ffmpeg", "-version").await {
        missing.push("ffmpeg - required for audio conversion".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
