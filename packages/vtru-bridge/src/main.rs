//! VTRU Bridge service and CLI
//!
//! `serve` runs the balance poller and the HTTP API until SIGINT/SIGTERM.
//! The other subcommands run a single read or operation and exit.

use std::sync::Arc;

use alloy::primitives::Address;
use clap::{Parser, Subcommand, ValueEnum};
use eyre::{eyre, Result};
use tracing::{error, info, warn};

use vtru_bridge::clients::{EvmReader, EvmWriter, LocalWallet, Wallet as _};
use vtru_bridge::config::Config;
use vtru_bridge::orchestrator::{OperationResult, SwapOrchestrator};
use vtru_bridge::registry::{ContractKey, Registry};
use vtru_bridge::server::{self, AppState, Metrics};
use vtru_bridge::synchronizer::BalanceSynchronizer;
use vtru_bridge::types::{Direction, Flow};

type AppWallet = LocalWallet<EvmReader>;

#[derive(Debug, Parser)]
#[command(name = "vtru-bridge")]
#[command(about = "Wrap VTRU and bridge USDC between Polygon and Vitruveo")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll balances and serve the HTTP API (default)
    Serve,
    /// Print balances for an account
    Balances {
        /// Account to read; defaults to the signer or WATCH_ADDRESS
        #[arg(long)]
        account: Option<Address>,
        #[arg(long, value_enum)]
        flow: Option<FlowArg>,
    },
    /// Print wrap circuit breaker limits
    Limits {
        #[arg(long)]
        account: Option<Address>,
    },
    /// Wrap native VTRU into wVTRU
    Wrap { amount: String },
    /// Unwrap wVTRU into native VTRU
    Unwrap { amount: String },
    /// Bridge USDC between Polygon and Vitruveo
    Bridge {
        amount: String,
        /// Destination chain
        #[arg(long, value_enum, default_value = "vitruveo")]
        to: ChainArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FlowArg {
    Wrap,
    Bridge,
}

impl From<FlowArg> for Flow {
    fn from(arg: FlowArg) -> Self {
        match arg {
            FlowArg::Wrap => Flow::Wrap,
            FlowArg::Bridge => Flow::Bridge,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChainArg {
    Polygon,
    Vitruveo,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;
    info!(
        polygon_rpc = %config.polygon_rpc_url,
        vitruveo_rpc = %config.vitruveo_rpc_url,
        flow = %config.flow,
        "Configuration loaded"
    );

    let app = App::new(&config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, &app, config.flow).await,
        Command::Balances { account, flow } => {
            if let Some(account) = account {
                app.wallet.connect(account);
            }
            let flow = flow.map(Flow::from).unwrap_or(config.flow);
            print_balances(&config, &app, flow).await
        }
        Command::Limits { account } => {
            let account = account.or(app.wallet_account());
            let sync = app.synchronizer(&config, Flow::Wrap);
            let limits = sync.fetch_limits(account).await?;
            println!("{}", serde_json::to_string_pretty(&limits)?);
            Ok(())
        }
        Command::Wrap { amount } => {
            run_operation(&config, &app, &amount, Direction::UnwrappedToWrapped).await
        }
        Command::Unwrap { amount } => {
            run_operation(&config, &app, &amount, Direction::WrappedToUnwrapped).await
        }
        Command::Bridge { amount, to } => {
            let direction = match to {
                ChainArg::Vitruveo => Direction::PolygonToVitruveo,
                ChainArg::Polygon => Direction::VitruveoToPolygon,
            };
            run_operation(&config, &app, &amount, direction).await
        }
    }
}

/// Collaborators shared by every subcommand
struct App {
    registry: Arc<Registry>,
    reader: Arc<EvmReader>,
    writer: Arc<EvmWriter>,
    wallet: Arc<AppWallet>,
}

impl App {
    fn new(config: &Config) -> Result<Self> {
        let registry = Arc::new(config.registry()?);
        let reader = Arc::new(EvmReader::new(&registry)?);

        let writer = match &config.private_key {
            Some(key) => EvmWriter::from_private_key(Arc::clone(&registry), key)?,
            None => EvmWriter::read_only(Arc::clone(&registry)),
        };

        let wallet = Arc::new(LocalWallet::new(
            Arc::clone(&registry),
            Arc::clone(&reader),
        ));
        if let Some(account) = writer.address().or(config.watch_address) {
            wallet.connect(account);
        }

        Ok(Self {
            registry,
            reader,
            writer: Arc::new(writer),
            wallet,
        })
    }

    fn wallet_account(&self) -> Option<Address> {
        self.wallet.current_account()
    }

    fn synchronizer(
        &self,
        config: &Config,
        flow: Flow,
    ) -> Arc<BalanceSynchronizer<EvmReader, AppWallet>> {
        Arc::new(BalanceSynchronizer::new(
            flow,
            Arc::clone(&self.registry),
            Arc::clone(&self.reader),
            Arc::clone(&self.wallet),
            config.poll_timing(),
        ))
    }

    fn orchestrator(
        &self,
        config: &Config,
    ) -> Arc<SwapOrchestrator<EvmReader, AppWallet, EvmWriter>> {
        Arc::new(SwapOrchestrator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.wallet),
            Arc::clone(&self.reader),
            Arc::clone(&self.writer),
            config.orchestrator_config(),
        ))
    }
}

async fn serve(config: &Config, app: &App, flow: Flow) -> Result<()> {
    info!(account = ?app.wallet_account(), "Starting VTRU Bridge service");
    if flow == Flow::Wrap && !app.registry.has_contract(ContractKey::WrappedVtru) {
        warn!("WRAP_CONTRACT_ADDRESS not set, wrap flow reads and operations will fail");
    }

    let synchronizer = app.synchronizer(config, flow);
    let orchestrator = app.orchestrator(config);
    let poller = synchronizer.start(orchestrator.subscribe_busy());

    let state = AppState {
        synchronizer,
        orchestrator,
        metrics: Arc::new(Metrics::new()),
    };

    let bind = config.api_bind_address.clone();
    let port = config.api_port;
    let server_task = tokio::spawn(async move { server::start_server(&bind, port, state).await });

    tokio::select! {
        _ = wait_for_shutdown_signal() => {}
        result = server_task => {
            match result {
                Ok(Ok(())) => info!("API server exited"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    poller.stop().await?;
    info!("VTRU Bridge stopped");
    Ok(())
}

async fn print_balances(config: &Config, app: &App, flow: Flow) -> Result<()> {
    let account = app
        .wallet_account()
        .ok_or_else(|| eyre!("No account: pass --account, WATCH_ADDRESS or WALLET_PRIVATE_KEY"))?;

    let snapshot = app.synchronizer(config, flow).refresh(Some(account)).await?;
    println!("Account: {}", account);
    if snapshot.is_empty() {
        println!("  no balances");
    }
    for balance in &snapshot.balances {
        println!(
            "  {:<10} {}",
            balance.holding.asset().symbol,
            balance.amount
        );
    }
    for allowance in &snapshot.allowances {
        println!(
            "  {:<10} allowance to {}: {}",
            allowance.holding.asset().symbol,
            allowance.spender,
            allowance.granted
        );
    }
    Ok(())
}

async fn run_operation(
    config: &Config,
    app: &App,
    amount: &str,
    direction: Direction,
) -> Result<()> {
    let account = app
        .wallet_account()
        .ok_or_else(|| eyre!("No account connected"))?;

    let snapshot = app
        .synchronizer(config, direction.flow())
        .refresh(Some(account))
        .await?;
    let result = app
        .orchestrator(config)
        .submit(amount, direction, &snapshot)
        .await;

    let notification = result.notification(direction);
    println!("{}: {}", notification.title, notification.description);

    match result {
        OperationResult::Success(receipt) => {
            if let Some(approval) = &receipt.approval {
                println!("  approval: {} on {}", approval.tx_hash, approval.chain);
            }
            println!(
                "  {}: {} on {}",
                direction.operation_name().to_lowercase(),
                receipt.transaction.tx_hash,
                receipt.transaction.chain
            );
            Ok(())
        }
        OperationResult::Failure(e) | OperationResult::Rejected(e) => Err(e.into()),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vtru_bridge=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
