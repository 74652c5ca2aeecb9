use facet::Facet;
use figue as args;
use rowlock::{EntityLocker, LockerConfig, Retention};
use std::time::Duration;

mod scenarios;

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    #[facet(args::named, default)]
    threads: Option<u32>,
    #[facet(args::named, default)]
    keys: Option<u32>,
    #[facet(args::named, default)]
    timeout_ms: Option<u64>,
    #[facet(args::named, default)]
    evict_idle: bool,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    Contention,
    Timeout,
    Reentrancy,
    Deadlock,
    Cancellation,
    Snapshot,
}

/// Knobs shared by every scenario.
pub(crate) struct ScenarioConfig {
    pub threads: usize,
    pub keys: u64,
    pub timeout: Duration,
    pub locker: LockerConfig,
}

impl ScenarioConfig {
    pub fn locker(&self) -> EntityLocker<u64> {
        EntityLocker::with_config(self.locker.clone())
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> AnyResult<()> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = config_from_cli(&cli)?;
    tracing::info!(
        threads = cfg.threads,
        keys = cfg.keys,
        timeout_ms = cfg.timeout.as_millis() as u64,
        retention = %cfg.locker.retention,
        "starting scenario {:?}",
        cli.command
    );
    dispatch_command(&cfg, cli.command)
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("rowlock-examples")
                .description("Run rowlock scenarios as subcommands")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}

fn config_from_cli(cli: &Cli) -> AnyResult<ScenarioConfig> {
    // `--evict-idle` wins over ROWLOCK_RETENTION.
    let mut locker = LockerConfig::from_env().map_err(|e| e.to_string())?;
    if cli.evict_idle {
        locker = locker.with_retention(Retention::EvictIdle);
    }

    let threads = cli.threads.unwrap_or(4);
    if threads == 0 {
        return Err("--threads must be at least 1".to_owned());
    }
    let keys = cli.keys.unwrap_or(8);
    if keys == 0 {
        return Err("--keys must be at least 1".to_owned());
    }

    Ok(ScenarioConfig {
        threads: threads as usize,
        keys: u64::from(keys),
        timeout: Duration::from_millis(cli.timeout_ms.unwrap_or(100)),
        locker,
    })
}

fn dispatch_command(cfg: &ScenarioConfig, command: CommandKind) -> AnyResult<()> {
    match command {
        CommandKind::Contention => scenarios::contention::run(cfg),
        CommandKind::Timeout => scenarios::timeout::run(cfg),
        CommandKind::Reentrancy => scenarios::reentrancy::run(cfg),
        CommandKind::Deadlock => scenarios::deadlock::run(cfg),
        CommandKind::Cancellation => scenarios::cancellation::run(cfg),
        CommandKind::Snapshot => scenarios::snapshot::run(cfg),
    }
}
