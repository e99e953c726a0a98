use anyhow::Result;
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask", about = "Guardian Beacon 开发任务自动化")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建守护进程和 CLI (release)
    Build {
        /// 启用 BlueZ 后端 (需要 libdbus)
        #[arg(long)]
        bluez: bool,
    },
    /// 运行守护进程 (开发模式)
    Dev {
        /// 使用 BlueZ 后端代替模拟无线电
        #[arg(long)]
        bluez: bool,
        /// 日志级别 (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "debug")]
        log_level: String,
    },
    /// 运行测试
    Test,
    /// 运行 clippy
    Clippy,
    /// 清理构建产物
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // 确保在项目根目录执行
    let project_root = match std::env::var("CARGO_MANIFEST_DIR")
        .map(std::path::PathBuf::from)
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build { bluez } => build(&sh, bluez)?,
        Commands::Dev { bluez, log_level } => dev(&sh, bluez, &log_level)?,
        Commands::Test => test(&sh)?,
        Commands::Clippy => clippy(&sh)?,
        Commands::Clean => clean(&sh)?,
    }

    Ok(())
}

fn feature_args(bluez: bool) -> Vec<&'static str> {
    if bluez {
        vec!["--features", "guardian-daemon/bluez"]
    } else {
        Vec::new()
    }
}

fn build(sh: &Shell, bluez: bool) -> Result<()> {
    println!("🔨 构建守护进程和 CLI...");
    let features = feature_args(bluez);
    cmd!(
        sh,
        "cargo build --release -p guardian-daemon -p guardian-cli {features...}"
    )
    .run()?;
    println!("✅ 构建完成");
    Ok(())
}

fn dev(sh: &Shell, bluez: bool, log_level: &str) -> Result<()> {
    println!("🚀 启动开发模式守护进程...");
    if bluez {
        println!("   后端: BlueZ (请在设置中将 backend 设为 \"bluez\")");
    }
    let rust_log = format!("info,guardian_core={level},bluer={level}", level = log_level);
    let features = feature_args(bluez);
    let _env = sh.push_env("RUST_LOG", rust_log);
    cmd!(sh, "cargo run -p guardian-daemon {features...}").run()?;
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 运行测试...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ 测试完成");
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    println!("📎 运行 clippy...");
    cmd!(sh, "cargo clippy --workspace --all-targets").run()?;
    println!("✅ clippy 通过");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 清理构建产物...");
    cmd!(sh, "cargo clean").run()?;
    println!("✅ 清理完成");
    Ok(())
}
