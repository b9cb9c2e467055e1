//! Local Notify CLI
//!
//! 调度、取消、查看本地通知；`lnotify run` 保持定时器就绪并在触发时展示通知。

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use local_notify::cli::{format_output, format_schedule_table, parse_user_info, run_daemon, ScheduleArgs};
use local_notify::host::center::read_journal;
use local_notify::host::{FileForeground, TokioTimerService};
use local_notify::{CancelOutcome, Config, EngineBuilder, ForegroundState, NotificationEngine, NotifyError};

#[derive(Parser)]
#[command(name = "lnotify")]
#[command(about = "Local Notify - schedule and group local notifications")]
#[command(version)]
struct Cli {
    /// 配置文件（默认: ~/.config/local-notify/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 调度（或替换）一条通知
    Schedule(ScheduleArgs),
    /// 取消一条已调度的通知
    Cancel {
        /// 通知 id
        id: String,
    },
    /// 取消 user info 包含所有给定键值对的通知
    CancelMatching {
        /// 键值对，可重复
        #[arg(long = "user-info", value_name = "KEY=VALUE", required = true)]
        user_info: Vec<String>,
    },
    /// 取消全部通知
    CancelAll,
    /// 列出已调度的通知
    List {
        /// 输出 JSON
        #[arg(long)]
        json: bool,
    },
    /// 查看一条已调度的通知
    Show {
        /// 通知 id
        id: String,
    },
    /// 立即触发一条已调度的通知
    Fire {
        /// 通知 id
        id: String,
        /// 只构建通知，不展示
        #[arg(long)]
        dry_run: bool,
    },
    /// 记录应用当前展示的内容，用于抑制判断
    Foreground {
        /// 应用是否在前台
        #[arg(long)]
        in_foreground: bool,
        /// 当前打开的群聊 id，-1 表示没有
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        group_in_view: i64,
    },
    /// 从展示日志查看最近展示的通知
    History {
        /// 显示条数
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },
    /// 保持定时器就绪，触发时展示通知
    Run {
        /// 只构建通知，不展示
        #[arg(long)]
        dry_run: bool,
    },
}

/// 为单次命令创建引擎，定时器随进程退出
fn engine_for(config: &Config, dry_run: bool) -> Result<NotificationEngine> {
    let (tx, _rx) = mpsc::unbounded_channel();
    let timer = TokioTimerService::new(tx)
        .with_best_effort_window(Duration::from_secs(config.best_effort_window_secs.max(1)));
    EngineBuilder::from_config(config)
        .timer(Arc::new(timer))
        .dry_run(dry_run)
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 控制日志级别，例如 RUST_LOG=debug lnotify run
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("local_notify=info,lnotify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    debug!(data_dir = %config.data_dir.display(), "Config loaded");

    match cli.command {
        Commands::Schedule(args) => {
            let attrs = args.into_attributes(Utc::now())?;
            let engine = engine_for(&config, false)?;
            engine.schedule(&attrs)?;
            let at = attrs
                .fire_at()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| attrs.fire_date.to_string());
            println!("Scheduled {} at {}", attrs.id, at);
        }
        Commands::Cancel { id } => {
            let engine = engine_for(&config, false)?;
            match engine.cancel(&id)? {
                CancelOutcome::Removed => println!("Cancelled {}", id),
                CancelOutcome::NotFound => println!("Nothing scheduled under {}", id),
            }
        }
        Commands::CancelMatching { user_info } => {
            let filter = parse_user_info(&user_info)?;
            let engine = engine_for(&config, false)?;
            let cancelled = engine.cancel_matching(&filter)?;
            println!("Cancelled {} notification(s)", cancelled.len());
            for id in cancelled {
                println!("  {}", id);
            }
        }
        Commands::CancelAll => {
            let engine = engine_for(&config, false)?;
            let cancelled = engine.cancel_all()?;
            println!("Cancelled {} notification(s)", cancelled.len());
        }
        Commands::List { json } => {
            let engine = engine_for(&config, false)?;
            let records = engine.list()?;
            if json {
                println!("{}", format_output(&records));
            } else {
                print!("{}", format_schedule_table(&records));
            }
        }
        Commands::Show { id } => {
            let engine = engine_for(&config, false)?;
            match engine.get(&id) {
                Ok(attrs) => println!("{}", attrs.to_json()?),
                Err(NotifyError::NotFound(_)) => bail!("nothing scheduled under {}", id),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Fire { id, dry_run } => {
            let engine = engine_for(&config, dry_run)?;
            let report = engine.fire_now(&id)?;
            info!(id = %report.id, delivery = ?report.delivery, "Fired");
            println!("{}", format_output(&serde_json::json!({
                "id": report.id,
                "delivery": format!("{:?}", report.delivery),
                "nextFire": report.next_fire,
                "rescheduleError": report.reschedule_error,
            })));
        }
        Commands::Foreground { in_foreground, group_in_view } => {
            let state = ForegroundState {
                app_in_foreground: in_foreground,
                group_id_in_view: group_in_view,
            };
            FileForeground::new(config.foreground_path()).write(&state)?;
            println!("{}", format_output(&state));
        }
        Commands::History { limit } => {
            let records = read_journal(&config.journal_path(), limit);
            if records.is_empty() {
                println!("No notifications presented yet");
            }
            for record in records {
                println!(
                    "{} {:<11} {}",
                    record.ts.format("%Y-%m-%d %H:%M:%S"),
                    format!("{:?}", record.action),
                    record.key.as_deref().unwrap_or("*")
                );
            }
        }
        Commands::Run { dry_run } => {
            run_daemon(&config, dry_run).await?;
        }
    }

    Ok(())
}
