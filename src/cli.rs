use clap::{ArgAction, Parser, ValueEnum};

use hf_dl::config::{DEFAULT_ENDPOINT, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DownloadMode {
    /// Decide from the address
    Auto,
    /// Expect a single file address
    Single,
    /// Expect a repository directory address
    Batch,
}

#[derive(Parser, Debug)]
#[command(name = "hf-dl")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// File or directory address (resolve/blob/tree links, or any http(s) URL)
    pub url: String,

    /// Output directory
    #[arg(short, long, default_value = "./downloads")]
    pub output: String,

    /// Save a single file under this name instead of the one in the URL
    #[arg(short = 'f', long)]
    pub filename: Option<String>,

    /// Download mode
    #[arg(short, long, value_enum, default_value = "auto")]
    pub mode: DownloadMode,

    /// Indices to download from a directory listing, e.g. 0,2,5-7
    #[arg(short, long)]
    pub select: Option<String>,

    /// Only consider listing entries whose path contains this text
    #[arg(long)]
    pub filter: Option<String>,

    /// Print the directory listing and exit
    #[arg(long)]
    pub list: bool,

    /// Print the directory listing as JSON and exit
    #[arg(long)]
    pub json: bool,

    /// Hub endpoint used for listings and downloads
    #[arg(long, env = "HF_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// HTTP proxy (e.g., http://127.0.0.1:7890)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Attempts per file when the connection drops
    #[arg(short, long, default_value = "3")]
    pub retries: u32,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn settings(&self) -> Settings {
        Settings::default()
            .with_endpoint(self.endpoint.as_str())
            .with_proxy(self.proxy.clone())
            .with_max_attempts(self.retries)
    }

    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["hf-dl", "https://hf-mirror.com/a/b/tree/main"]).unwrap();
        assert_eq!(args.mode, DownloadMode::Auto);
        assert_eq!(args.output, "./downloads");
        assert_eq!(args.retries, 3);
        assert_eq!(args.log_level(), "info");
    }

    #[test]
    fn settings_follow_flags() {
        let args = Args::try_parse_from([
            "hf-dl",
            "x",
            "--endpoint",
            "http://localhost:8080/",
            "--retries",
            "5",
            "-vv",
        ])
        .unwrap();
        let settings = args.settings();
        assert_eq!(settings.endpoint, "http://localhost:8080");
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(args.log_level(), "trace");
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        assert!(Args::try_parse_from(["hf-dl", "x", "-q", "-v"]).is_err());
    }
}
