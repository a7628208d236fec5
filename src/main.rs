use std::{error::Error, sync::Arc, thread, time::Duration};

use clap::Parser;
use dining_philosophers::{
    ConfigError, LogSink, Table, TableConfig, Timing, WriterSink, DEFAULT_APPETITE,
    DEFAULT_PHILOSOPHERS,
};
use libc::SIGINT;
use signal_hook::iterator::Signals;
use tracing_subscriber::EnvFilter;

// 5人までは古典的な顔ぶれ
const NAMES: [(&str, &str); 5] = [
    ("[P]", "Plato"),
    ("[S]", "Socrates"),
    ("[K]", "Kant"),
    ("[D]", "Descartes"),
    ("[C]", "Confucius"),
];

/// Dining philosophers simulation using the resource hierarchy solution
#[derive(Parser, Debug)]
#[command(name = "dining_philosophers", version, about, long_about = None)]
struct Cli {
    /// Number of philosophers (and chopsticks) at the table
    #[arg(short = 'n', long, default_value_t = DEFAULT_PHILOSOPHERS as i64, allow_negative_numbers = true)]
    philosophers: i64,

    /// How many meals each philosopher eats before leaving
    #[arg(short, long, default_value_t = DEFAULT_APPETITE as i64, allow_negative_numbers = true)]
    appetite: i64,

    /// Comma separated display names, one per philosopher
    #[arg(long, value_delimiter = ',')]
    names: Option<Vec<String>>,

    #[arg(long, default_value_t = 1000)]
    think_min_ms: u64,

    #[arg(long, default_value_t = 2000)]
    think_max_ms: u64,

    #[arg(long, default_value_t = 1000)]
    eat_min_ms: u64,

    #[arg(long, default_value_t = 2000)]
    eat_max_ms: u64,

    /// Delay between picking up the first and the second chopstick
    #[arg(long, default_value_t = 50)]
    pickup_delay_ms: u64,

    /// Upper bound of the random delay before a philosopher starts
    #[arg(long, default_value_t = 1800)]
    stagger_ms: u64,

    /// Seed for reproducible think/eat durations
    #[arg(long)]
    seed: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn table_config(&self) -> TableConfig {
        // 0 以下はコア側で設定エラーにさせる
        let philosophers = usize::try_from(self.philosophers).unwrap_or(0);
        let appetite = usize::try_from(self.appetite).unwrap_or(0);

        let mut config = TableConfig::new(philosophers, appetite)
            .with_think_range(
                Duration::from_millis(self.think_min_ms),
                Duration::from_millis(self.think_max_ms),
            )
            .with_eat_range(
                Duration::from_millis(self.eat_min_ms),
                Duration::from_millis(self.eat_max_ms),
            )
            .with_pickup_delay(Duration::from_millis(self.pickup_delay_ms))
            .with_stagger(Duration::from_millis(self.stagger_ms));
        if let Some(names) = &self.names {
            config = config.with_names(names.iter().map(|n| n.trim().to_string()));
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

fn classic_names(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| match NAMES.get(i) {
            Some((id, name)) => format!("{id} {name}"),
            None => format!("[{i}] Philosopher {i}"),
        })
        .collect()
}

// 人数と食欲が不正なら既定値に置き換えて並べ直す
// 人数を置き換えたときは指定された名前も使わない
fn set_table(mut config: TableConfig, sink: Arc<dyn LogSink>) -> Result<Table, Box<dyn Error>> {
    let mut named = config.names.is_some();
    loop {
        if !named {
            config.names = Some(classic_names(config.philosophers));
        }
        match Table::new(config.clone(), sink.clone()) {
            Ok(table) => return Ok(table),
            Err(dining_philosophers::Error::Config(ConfigError::InvalidPhilosopherCount {
                count,
            })) => {
                tracing::warn!(
                    count,
                    default = DEFAULT_PHILOSOPHERS,
                    "invalid philosopher count, using default"
                );
                eprintln!("Invalid number of philosophers ({count}), using {DEFAULT_PHILOSOPHERS}");
                config.philosophers = DEFAULT_PHILOSOPHERS;
                // 人数に合わなくなった名前は捨てて既定の顔ぶれにする
                if named {
                    eprintln!("Ignoring --names, seating the default philosophers");
                    named = false;
                }
            }
            Err(dining_philosophers::Error::Config(ConfigError::InvalidAppetite { appetite })) => {
                tracing::warn!(
                    appetite,
                    default = DEFAULT_APPETITE,
                    "invalid appetite, using default"
                );
                eprintln!("Invalid appetite ({appetite}), using {DEFAULT_APPETITE}");
                config.appetite = DEFAULT_APPETITE;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn print_arrangement(table: &Table) {
    println!("\n=== Philosophers at the table: ===");
    for p in table.philosophers() {
        println!(
            "{} has chopsticks {} (left) and {} (right)",
            p.name(),
            p.left().index(),
            p.right().index()
        );
    }
    if table.philosophers().len() == 1 {
        println!("(alone at the table: both hands share the same chopstick)");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let sink: Arc<dyn LogSink> = Arc::new(WriterSink::stdout());
    let mut table = set_table(cli.table_config(), sink)?;
    let timing: Timing = table.config().timing;
    tracing::debug!(?timing, seed = ?table.config().seed, "table set");

    println!("=== Dining Philosophers Problem Simulation ===");
    println!("Press Ctrl+C to end the dinner");
    println!("Each philosopher will eat {} times", table.config().appetite);
    print_arrangement(&table);

    // Ctrl+C で全員に止まるよう伝える
    let stop = table.stop_handle();
    let mut signals = Signals::new([SIGINT])?;
    thread::spawn(move || {
        for _ in signals.forever() {
            if !stop.is_stop_requested() {
                println!("\n=== Dinner is over! Philosophers finishing... ===");
            }
            stop.request_stop();
        }
    });

    println!("\n=== Dinner has started! ===");
    table.start()?;
    table.await_completion().await?;

    println!("\n=== Everyone has finished eating! ===");
    for s in table.snapshot() {
        println!("{}: {}/{} meals", s.name, s.meals_eaten, s.appetite);
    }
    Ok(())
}
