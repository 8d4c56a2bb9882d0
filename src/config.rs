use crate::queue::QueueName;
use crate::shape::Thresholds;
use anyhow::{ensure, Error, Result};
use std::convert::TryFrom;
use std::path::PathBuf;
use structopt::StructOpt;

/// Detects mail surges in postfix queues. qshape(1) breaks each queue down into age buckets of
/// INTERVAL minutes; a queue surges if a bucket other than the newest one holds more mails
/// than the warning or critical threshold.
#[derive(StructOpt, Debug)]
#[structopt(
    author,
    after_help = "Leaving -w/-c at 0 disables the threshold. Checks all queues if no QUEUE is \
                  given.",
    max_term_width = 80
)]
pub struct Opt {
    /// Warning if more than N mails are in a single bucket
    #[structopt(short, long, default_value = "100", value_name = "N", display_order = 1)]
    pub warn: u64,
    /// Critical if more than N mails are in a single bucket
    #[structopt(short, long, default_value = "500", value_name = "N", display_order = 2)]
    pub crit: u64,
    /// Bucket interval
    #[structopt(short = "t", long, default_value = "5", value_name = "MINUTES")]
    pub interval: u32,
    /// Number of age buckets
    #[structopt(short, long, default_value = "10", value_name = "N")]
    pub buckets: usize,
    /// Number of top domains shown in verbose mode
    #[structopt(short = "n", long, default_value = "10", value_name = "N")]
    pub top: usize,
    /// Distribution by sender instead of recipient domain
    #[structopt(short, long)]
    pub sender: bool,
    /// Linear instead of geometric bucket sizes
    #[structopt(short, long)]
    pub linear: bool,
    /// Checks the oldest bucket, too (as average over all buckets)
    #[structopt(short = "L", long)]
    pub last_bucket: bool,
    /// Prints per-domain distributions of non-empty queues
    #[structopt(short, long)]
    pub verbose: bool,
    /// Output width passed to qshape
    #[structopt(short = "W", long, default_value = "80", value_name = "COLUMNS")]
    pub width: usize,
    /// Alternate postfix configuration directory
    #[structopt(short = "C", long, value_name = "DIR", parse(from_os_str))]
    pub config_dir: Option<PathBuf>,
    /// Path to the `qshape` binary
    #[structopt(long, default_value = "qshape", value_name = "PATH", parse(from_os_str))]
    pub qshape: PathBuf,
    /// Queue to check
    #[structopt(value_name = "QUEUE", possible_values = &QueueName::NAMES)]
    pub queues: Vec<QueueName>,
}

/// Validated settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub warn: u64,
    pub crit: u64,
    pub interval: u32,
    pub buckets: usize,
    pub top: usize,
    pub sender: bool,
    pub linear: bool,
    pub last_bucket: bool,
    pub verbose: bool,
    pub width: usize,
    pub config_dir: Option<PathBuf>,
    pub qshape: PathBuf,
    pub queues: Vec<QueueName>,
}

impl Config {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            warn: self.warn,
            crit: self.crit,
        }
    }

    /// Time span covered by all buckets except the oldest one
    pub fn window(&self) -> u64 {
        u64::from(self.interval).saturating_mul(self.buckets as u64 - 1)
    }
}

impl TryFrom<Opt> for Config {
    type Error = Error;

    fn try_from(opt: Opt) -> Result<Self> {
        ensure!(opt.interval > 0, "interval must be at least 1 minute");
        ensure!(opt.buckets > 1, "at least 2 buckets required");
        ensure!(
            opt.warn == 0 || opt.crit == 0 || opt.crit >= opt.warn,
            "critical threshold ({}) below warning threshold ({})",
            opt.crit,
            opt.warn
        );
        let mut queues = Vec::with_capacity(QueueName::ALL.len());
        for q in opt.queues {
            if !queues.contains(&q) {
                queues.push(q)
            }
        }
        if queues.is_empty() {
            queues.extend_from_slice(&QueueName::ALL);
        }
        Ok(Self {
            warn: opt.warn,
            crit: opt.crit,
            interval: opt.interval,
            buckets: opt.buckets,
            top: opt.top,
            sender: opt.sender,
            linear: opt.linear,
            last_bucket: opt.last_bucket,
            verbose: opt.verbose,
            width: opt.width,
            config_dir: opt.config_dir,
            qshape: opt.qshape,
            queues,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config> {
        let argv = std::iter::once("check_qshape").chain(args.iter().copied());
        Config::try_from(Opt::from_iter_safe(argv)?)
    }

    #[test]
    fn defaults() {
        let c = parse(&[]).unwrap();
        assert_eq!(c.thresholds(), Thresholds { warn: 100, crit: 500 });
        assert_eq!((c.interval, c.buckets, c.top, c.width), (5, 10, 10, 80));
        assert!(!(c.sender || c.linear || c.last_bucket || c.verbose));
        assert_eq!(c.config_dir, None);
        assert_eq!(c.qshape, PathBuf::from("qshape"));
        assert_eq!(c.queues, QueueName::ALL);
        assert_eq!(c.window(), 45);
    }

    #[test]
    fn queue_order_preserved_without_duplicates() {
        let c = parse(&["hold", "deferred", "hold"]).unwrap();
        assert_eq!(c.queues, [QueueName::Hold, QueueName::Deferred]);
    }

    #[test]
    fn reject_unknown_queue() {
        assert!(parse(&["corrupt"]).is_err());
    }

    #[test]
    fn crit_must_not_be_below_warn() {
        assert!(parse(&["-w", "10", "-c", "5"]).is_err());
        assert!(parse(&["-w", "10", "-c", "10"]).is_ok());
        assert!(parse(&["-w", "10", "-c", "0"]).is_ok());
        assert!(parse(&["-w", "0", "-c", "5"]).is_ok());
    }

    #[test]
    fn reject_degenerate_buckets() {
        assert!(parse(&["-t", "0"]).is_err());
        assert!(parse(&["-b", "1"]).is_err());
        assert!(parse(&["-b", "2"]).is_ok());
    }

    #[test]
    fn reject_negative_threshold() {
        assert!(parse(&["-w", "-1"]).is_err());
    }

    #[test]
    fn window_saturates() {
        let b = usize::MAX.to_string();
        let c = parse(&["-t", "4294967295", "-b", &b]).unwrap();
        assert_eq!(c.window(), u64::MAX);
        assert_eq!(parse(&["-t", "15", "-b", "9"]).unwrap().window(), 120);
    }
}
