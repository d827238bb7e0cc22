const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

pub struct BannerInfo {
    pub version: &'static str,
    pub build_time: String,
    pub branch: &'static str,
    pub commit: &'static str,
    pub profile: &'static str,
}

impl Default for BannerInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            build_time: human_time(env_or!("BUILD_TIME", "")),
            branch: env_or!("GIT_BRANCH", "unknown"),
            commit: env_or!("GIT_COMMIT", "unknown"),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }
}

pub fn print_banner(info: &BannerInfo) {
    println!();
    println!("{GREEN}   ___ __ _ _ __   ___  _ __  _   _ {RESET}");
    println!("{GREEN}  / __/ _` | '_ \\ / _ \\| '_ \\| | | |{RESET}");
    println!("{GREEN} | (_| (_| | | | | (_) | |_) | |_| |{RESET}");
    println!("{GREEN}  \\___\\__,_|_| |_|\\___/| .__/ \\__, |{RESET}");
    println!("{GREEN}                       |_|    |___/ {RESET}");
    println!("{DIM}========================================{RESET}");
    println!();

    print_row("Version", info.version, CYAN);
    print_row("Build time", &info.build_time, RESET);
    print_row("Branch", info.branch, RESET);
    print_row("Commit", short_commit(info.commit), RESET);
    print_row("Profile", info.profile, YELLOW);
    println!();
}

/// Render a unix timestamp in milliseconds as UTC, or `unknown`.
fn human_time(millis: &str) -> String {
    let format = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    millis
        .parse::<i128>()
        .ok()
        .and_then(|ms| time::OffsetDateTime::from_unix_timestamp_nanos(ms * 1_000_000).ok())
        .and_then(|at| at.format(&format).ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn short_commit(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}

fn print_row(label: &str, value: &str, color: &str) {
    println!("  {BOLD}{label:<14}{RESET}{color}{value}{RESET}");
}
