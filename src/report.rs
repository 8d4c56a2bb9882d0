use crate::config::Config;
use crate::error::{Error, EXIT_INVALID};
use crate::queue::{locate, run_queue, QueueResult};
use log::warn;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

static PREFIX: &str = "POSTFIX QSHAPE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Ok = 0,
    Warn = 1,
    Crit = 2,
    Unknown = 3,
    Missing = 127,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ok => "OK",
            Status::Warn => "WARN",
            Status::Crit => "CRIT",
            Status::Unknown => "UNKNOWN",
            Status::Missing => "MISSING",
        })
    }
}

/// What the surge counts refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Minutes(u64),
    EntireQueue,
}

impl Scope {
    fn of(cfg: &Config) -> Self {
        if cfg.last_bucket {
            Scope::EntireQueue
        } else {
            Scope::Minutes(cfg.window())
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Minutes(m) => write!(f, "in last {} minutes", m),
            Scope::EntireQueue => write!(f, "in entire queue"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub status: Status,
    pub scope: Scope,
    /// Surged queues only, in check order
    pub surged: Vec<QueueResult>,
    pub details: Vec<String>,
    pub separator: usize,
}

impl Report {
    pub fn new(cfg: &Config, results: Vec<QueueResult>) -> Self {
        let status = results
            .iter()
            .map(QueueResult::status)
            .max()
            .unwrap_or(Status::Ok);
        let details = results.iter().filter_map(|r| r.detail.clone()).collect();
        Self {
            status,
            scope: Scope::of(cfg),
            surged: results.into_iter().filter(QueueResult::surged).collect(),
            details,
            separator: cfg.width,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.status as i32
    }

    fn table(&self) -> Vec<String> {
        const HEADER: [&str; 5] = ["QUEUE NAME", "MAILS", "NEWEST", "WARN", "CRIT"];
        let rows: Vec<[String; 5]> = self
            .surged
            .iter()
            .map(|r| {
                [
                    r.name.to_string(),
                    r.mails.to_string(),
                    r.newest.to_string(),
                    r.surges.warn.to_string(),
                    r.surges.crit.to_string(),
                ]
            })
            .collect();
        let mut widths = HEADER.map(str::len);
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }
        let line = |cells: &[&str]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:>w$}", c, w = *w))
                .collect::<Vec<_>>()
                .join("  ")
        };
        let mut lines = vec![line(&HEADER)];
        lines.extend(
            rows.iter()
                .map(|row| line(&row.iter().map(String::as_str).collect::<Vec<_>>())),
        );
        lines
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Status::Ok => write!(f, "{} OK: no mail surges {}", PREFIX, self.scope)?,
            s => {
                write!(
                    f,
                    "{} {}: {} queue(s) with mail surges {}",
                    PREFIX,
                    s,
                    self.surged.len(),
                    self.scope
                )?;
                for l in self.table() {
                    write!(f, "\n{}", l)?;
                }
            }
        }
        // after the table so the first line stays the status line; a failed run prints none
        for d in &self.details {
            write!(f, "\n{}\n{}", "-".repeat(self.separator), d)?;
        }
        Ok(())
    }
}

/// Status line and exit code for a check that produced no report
pub fn failure(err: Error) -> (String, i32) {
    let code = err.exit_code();
    let msg = match err {
        Error::ToolMissing(_) => format!("{} {}: {}", PREFIX, Status::Missing, err),
        Error::Interrupted => format!("{} INTERRUPTED: {}", PREFIX, err),
        _ => format!("{} {}: {:#}", PREFIX, Status::Unknown, anyhow::Error::new(err)),
    };
    (msg, code)
}

/// Status line for arguments that failed validation
pub fn invalid(msg: impl fmt::Display) -> (String, i32) {
    (format!("{} INVALID: {}", PREFIX, msg), EXIT_INVALID)
}

/// Checks all configured queues in order. The first failure aborts the run and discards all
/// results gathered so far.
pub fn aggregate(cfg: &Config, interrupted: &AtomicBool) -> Result<Report, Error> {
    if locate(&cfg.qshape).is_none() {
        return Err(Error::ToolMissing(cfg.qshape.clone()));
    }
    let check = || {
        if interrupted.load(Ordering::SeqCst) {
            warn!("interrupted, discarding partial results");
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    };
    let mut results = Vec::with_capacity(cfg.queues.len());
    for &q in &cfg.queues {
        check()?;
        let res = run_queue(q, cfg);
        check()?;
        results.push(res?);
    }
    Ok(Report::new(cfg, results))
}
