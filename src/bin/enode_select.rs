//! 出口选择控制器
//!
//! 在进程内仿真转发面上运行闭环：测量各候选出口的丢包/时延，用 MAB 策略选择出口并重装引导路径。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use enode_select_rs::config::ControllerConfig;
use enode_select_rs::control::Controller;
use enode_select_rs::emu::{EmuPlane, EmuTopology};
use enode_select_rs::mab::PolicyKind;
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "enode-select", about = "基于 MAB 的域内出口选择控制器（仿真转发面）")]
struct Args {
    /// 配置文件（JSON）；不给时使用默认配置
    #[arg(long)]
    config: Option<PathBuf>,

    /// 仿真拓扑：bso 或 funet
    #[arg(long, default_value = "bso")]
    topology: String,

    /// 覆盖选臂策略，例如 ucb1、sp_ucb2:0.1、softmax:2、epsilon_greedy:0.1
    #[arg(long)]
    policy: Option<PolicyKind>,

    /// 覆盖轮数
    #[arg(long)]
    rounds: Option<u32>,

    /// 覆盖结果日志路径
    #[arg(long)]
    results: Option<PathBuf>,

    /// 仿真链路丢包的随机种子
    #[arg(long, default_value_t = 7)]
    emu_seed: u64,

    /// 结束时把最终统计以 JSON 打印到 stdout
    #[arg(long)]
    print_summary: bool,
}

fn load_config(args: &Args) -> Result<ControllerConfig, String> {
    let mut cfg = match &args.config {
        Some(path) => ControllerConfig::load(path).map_err(|e| e.to_string())?,
        None => ControllerConfig::default(),
    };
    if let Some(policy) = args.policy {
        cfg.policy = policy;
    }
    if let Some(rounds) = args.rounds {
        cfg.rounds = rounds;
    }
    if let Some(results) = &args.results {
        cfg.results_path = Some(results.clone());
    }
    cfg.validate().map_err(|e| e.to_string())?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化 tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let cfg = match load_config(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let Some(topo) = EmuTopology::by_name(&args.topology) else {
        eprintln!("error: unknown topology {:?} (expected bso or funet)", args.topology);
        return ExitCode::FAILURE;
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let plane = Arc::new(EmuPlane::new(&topo, cfg.host_subnet, args.emu_seed, events_tx));
    if let Err(e) = plane.announce() {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    let summary = Controller::new(cfg, plane).run(events_rx).await;

    if args.print_summary {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
