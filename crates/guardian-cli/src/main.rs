//! Guardian Beacon CLI
//!
//! 命令行客户端，通过 Unix Socket 向守护进程发送命令

mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use guardian_core::ble::{COMPANY_ID, parse_manufacturer_data};
use guardian_core::{BeaconSettings, Command, Reply};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "guardian", version, about = "Guardian Beacon - BLE 身份信标")]
struct Cli {
    /// 守护进程 socket 路径 (默认读取设置)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 开始广播
    Start {
        /// 用户 ID (默认使用设置中的 default_user_id)
        #[arg(short, long, allow_negative_numbers = true)]
        user_id: Option<i64>,
    },
    /// 停止广播
    Stop,
    /// 查看蓝牙是否开启
    Radio,
    /// 请求打开蓝牙
    Enable,
    /// 运行时权限
    Permissions {
        #[command(subcommand)]
        action: PermissionAction,
    },
    /// 打开系统的应用权限设置页
    Settings,
    /// 离线解码抓到的厂商数据
    Decode {
        /// 数据体 (十六进制)，如 00031806050e1e
        data: String,
        /// Company ID (十六进制)
        #[arg(short, long, value_parser = parse_company_id, default_value = "ffff")]
        company_id: u16,
    },
}

#[derive(Subcommand)]
enum PermissionAction {
    /// 读取当前授权状态，不弹窗
    Check,
    /// 为未授权的权限弹出系统对话框
    Request,
}

fn parse_company_id(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid company id {s:?}: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Decode { data, company_id } => return decode(&data, company_id),
        Commands::Start { user_id } => Command::StartAdvertising { user_id },
        Commands::Stop => Command::StopAdvertising,
        Commands::Radio => Command::IsBluetoothOn,
        Commands::Enable => Command::RequestEnableBluetooth,
        Commands::Permissions {
            action: PermissionAction::Check,
        } => Command::CheckNativePermissions,
        Commands::Permissions {
            action: PermissionAction::Request,
        } => Command::RequestNativePermissions,
        Commands::Settings => Command::OpenAppSettings,
    };

    let socket = cli
        .socket
        .unwrap_or_else(|| BeaconSettings::load().socket_path());
    let reply = client::send_request(&socket, &command.to_call()).await?;
    print_reply(command, &reply);

    if matches!(reply, Reply::Ok { .. }) {
        Ok(())
    } else {
        std::process::exit(1)
    }
}

fn print_reply(command: Command, reply: &Reply) {
    match reply {
        Reply::Ok { value } => match command {
            Command::StartAdvertising { .. } => println!("📡 广播已开始"),
            Command::StopAdvertising => println!("⏹️  广播已停止"),
            Command::IsBluetoothOn => {
                if value.as_bool() == Some(true) {
                    println!("🔵 蓝牙已开启");
                } else {
                    println!("⚪ 蓝牙已关闭");
                }
            }
            Command::RequestEnableBluetooth => println!("✅ 已请求打开蓝牙"),
            Command::CheckNativePermissions | Command::RequestNativePermissions => {
                print_permissions(value);
            }
            Command::OpenAppSettings => println!("✅ 已打开权限设置"),
        },
        Reply::Error { code, message } => eprintln!("❌ {}: {}", code, message),
        Reply::NotImplemented => eprintln!("❌ 守护进程不支持 {}", command.method()),
    }
}

fn print_permissions(value: &Value) {
    let Some(map) = value.as_object() else {
        println!("{}", value);
        return;
    };
    for (name, granted) in map {
        let icon = if granted.as_bool() == Some(true) {
            "✅"
        } else {
            "❌"
        };
        println!("   {} {}", icon, name);
    }
}

fn decode(data: &str, company_id: u16) -> Result<()> {
    let cleaned: String = data
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    let body = hex::decode(&cleaned)?;

    let (framing, payload) = parse_manufacturer_data(company_id, &body)?;
    println!("封装格式: {:?}", framing);
    if company_id != COMPANY_ID {
        println!("Company ID: 0x{:04X}", company_id);
    }
    println!("用户 ID:   {}", payload.user_id());
    println!("时间:      {}", payload.timestamp());
    Ok(())
}
