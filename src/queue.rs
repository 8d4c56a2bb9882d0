use crate::config::Config;
use crate::error::{Error, ParseError};
use crate::report::Status;
use crate::shape::{Buckets, Surges};
use anyhow::bail;
use log::{debug, info};
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use subprocess::{Exec, Redirection::Pipe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Active,
    Maildrop,
    Incoming,
    Deferred,
    Hold,
}

impl QueueName {
    pub const ALL: [QueueName; 5] = [
        QueueName::Active,
        QueueName::Maildrop,
        QueueName::Incoming,
        QueueName::Deferred,
        QueueName::Hold,
    ];

    pub const NAMES: [&'static str; 5] = ["active", "maildrop", "incoming", "deferred", "hold"];

    pub fn as_str(self) -> &'static str {
        Self::NAMES[self as usize]
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::NAMES.iter().position(|n| *n == s) {
            Some(i) => Ok(Self::ALL[i]),
            None => bail!("unknown queue '{}'", s),
        }
    }
}

/// Finds an executable `tool`. Bare names are looked up in $PATH.
pub fn locate(tool: &Path) -> Option<PathBuf> {
    let executable = |p: &Path| match p.metadata() {
        Ok(m) => m.is_file() && m.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    };
    if tool.components().count() > 1 {
        return Some(tool.to_path_buf()).filter(|p| executable(p));
    }
    env::split_paths(&env::var_os("PATH")?)
        .map(|dir| dir.join(tool))
        .find(|p| executable(p))
}

/// Full qshape invocation for `queue`, program name included. Optional flags appear iff the
/// corresponding option is set.
pub fn command_line(queue: QueueName, cfg: &Config) -> Vec<OsString> {
    let mut argv: Vec<OsString> = vec![
        cfg.qshape.clone().into(),
        "-t".into(),
        cfg.interval.to_string().into(),
        "-b".into(),
        cfg.buckets.to_string().into(),
        "-w".into(),
        cfg.width.to_string().into(),
    ];
    if cfg.sender {
        argv.push("-s".into());
    }
    if cfg.linear {
        argv.push("-l".into());
    }
    if let Some(dir) = &cfg.config_dir {
        argv.push("-c".into());
        argv.push(dir.into());
    }
    argv.push(queue.as_str().into());
    argv
}

fn display(argv: &[OsString]) -> String {
    argv.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Header line with the queue name written over its leading blanks
fn annotate(queue: QueueName, header: &str) -> String {
    let name = queue.as_str();
    let indent = header.bytes().take_while(|b| *b == b' ').count();
    if indent > name.len() {
        format!("{}{}", name, &header[name.len()..])
    } else {
        format!("{} {}", name, header.trim_start())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueResult {
    pub name: QueueName,
    pub mails: u64,
    pub newest: u64,
    pub oldest: u64,
    pub surges: Surges,
    /// Per-domain breakdown kept for verbose output
    pub detail: Option<String>,
}

impl QueueResult {
    pub fn from_output(name: QueueName, out: &str, cfg: &Config) -> Result<Self, ParseError> {
        let buckets = Buckets::parse(out, cfg.buckets)?;
        let mails = buckets.mails();
        let detail = if cfg.verbose && mails > 0 {
            let mut lines = out.lines();
            let mut block: Vec<String> =
                lines.next().map(|h| annotate(name, h)).into_iter().collect();
            block.extend(lines.take(cfg.top + 1).map(str::to_owned));
            Some(block.join("\n"))
        } else {
            None
        };
        Ok(Self {
            name,
            mails,
            newest: buckets.newest(),
            oldest: buckets.oldest(),
            surges: Surges::score(&buckets, cfg.thresholds(), cfg.last_bucket),
            detail,
        })
    }

    pub fn status(&self) -> Status {
        match self.surges {
            Surges { crit, .. } if crit > 0 => Status::Crit,
            s if s.total() > 0 => Status::Warn,
            _ => Status::Ok,
        }
    }

    pub fn surged(&self) -> bool {
        self.surges.total() > 0
    }
}

/// Runs qshape once for `name` and scores its output.
pub fn run_queue(name: QueueName, cfg: &Config) -> Result<QueueResult, Error> {
    let argv = command_line(name, cfg);
    let cmd = display(&argv);
    debug!("running `{}`", cmd);
    let c = Exec::cmd(&argv[0])
        .args(&argv[1..])
        .stdout(Pipe)
        .env("LANG", "C")
        .capture()
        .map_err(|source| Error::Launch {
            cmd: cmd.clone(),
            source,
        })?;
    if !c.success() {
        return Err(Error::ExitStatus {
            cmd,
            status: c.exit_status,
        });
    }
    let res = QueueResult::from_output(name, &c.stdout_str(), cfg)
        .map_err(|source| Error::Parse { queue: name, source })?;
    info!(
        "{}: {} mail(s), {} newest, {} oldest, {} warn / {} crit surge(s)",
        name, res.mails, res.newest, res.oldest, res.surges.warn, res.surges.crit
    );
    Ok(res)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::convert::TryFrom;
    use std::fs;
    use structopt::StructOpt;
    use tempfile::TempDir;

    fn cfg(args: &[&str]) -> Config {
        let argv = std::iter::once("check_qshape").chain(args.iter().copied());
        Config::try_from(crate::config::Opt::from_iter(argv)).unwrap()
    }

    fn strings(argv: Vec<OsString>) -> Vec<String> {
        argv.into_iter()
            .map(|a| a.into_string().unwrap())
            .collect()
    }

    static OUT: &str = concat!(
        "                                 T  5 10 20 40 80 160 320 640 1280 1280+\n",
        "                         TOTAL  13  0  1  2  0  0   0   0   0    0    10\n",
        "                   example.com  10  0  0  0  0  0   0   0   0    0    10\n",
        "                   example.org   2  0  1  1  0  0   0   0   0    0     0\n",
        "                   example.net   1  0  0  1  0  0   0   0   0    0     0\n",
    );

    #[test]
    fn queue_names() {
        for q in &QueueName::ALL {
            assert_eq!(q.to_string().parse::<QueueName>().unwrap(), *q);
        }
        assert!("corrupt".parse::<QueueName>().is_err());
        assert!("Active".parse::<QueueName>().is_err());
    }

    #[test]
    fn minimal_command_line() {
        assert_eq!(
            strings(command_line(QueueName::Deferred, &cfg(&[]))),
            ["qshape", "-t", "5", "-b", "10", "-w", "80", "deferred"]
        );
    }

    #[test]
    fn command_line_mirrors_flags() {
        let c = cfg(&[
            "-t", "15", "-b", "9", "-W", "120", "-s", "-l", "-C", "/etc/postfix-out",
            "--qshape", "/usr/sbin/qshape",
        ]);
        assert_eq!(
            strings(command_line(QueueName::Hold, &c)),
            [
                "/usr/sbin/qshape", "-t", "15", "-b", "9", "-w", "120", "-s", "-l", "-c",
                "/etc/postfix-out", "hold"
            ]
        );
        assert_eq!(
            strings(command_line(QueueName::Active, &cfg(&["-l"]))),
            ["qshape", "-t", "5", "-b", "10", "-w", "80", "-l", "active"]
        );
    }

    #[test]
    fn totals() {
        let r = QueueResult::from_output(QueueName::Active, OUT, &cfg(&[])).unwrap();
        assert_eq!((r.mails, r.newest, r.oldest), (13, 0, 10));
        assert_eq!(r.detail, None);
        assert_eq!(r.status(), Status::Ok);
        assert!(!r.surged());
    }

    #[test]
    fn verbose_detail_truncated_to_top_domains() {
        let r = QueueResult::from_output(QueueName::Deferred, OUT, &cfg(&["-v", "-n", "1"]))
            .unwrap();
        let header = OUT.lines().next().unwrap();
        let expected: Vec<String> = std::iter::once(format!("deferred{}", &header[8..]))
            .chain(OUT.lines().skip(1).take(2).map(str::to_owned))
            .collect();
        assert_eq!(r.detail.unwrap(), expected.join("\n"));
    }

    #[test]
    fn verbose_detail_shorter_than_requested() {
        let r = QueueResult::from_output(QueueName::Hold, OUT, &cfg(&["-v", "-n", "50"]))
            .unwrap();
        assert_eq!(r.detail.unwrap().lines().count(), 5);
    }

    #[test]
    fn no_detail_for_empty_queue() {
        let out = "h\nTOTAL 0 0 0 0 0 0 0 0 0 0\n";
        let r = QueueResult::from_output(QueueName::Hold, out, &cfg(&["-v"])).unwrap();
        assert_eq!(r.mails, 0);
        assert_eq!(r.detail, None);
    }

    #[test]
    fn annotate_indented_header() {
        assert_eq!(
            annotate(QueueName::Deferred, OUT.lines().next().unwrap()),
            format!("deferred{}T  5 10 20 40 80 160 320 640 1280 1280+", " ".repeat(25))
        );
    }

    #[test]
    fn annotate_without_room() {
        assert_eq!(annotate(QueueName::Incoming, "  T 5 10"), "incoming T 5 10");
    }

    #[test]
    fn status_from_surges() {
        let out = "h\nTOTAL 0 60 70 0 0 0 0 0 0 0\n";
        let r = QueueResult::from_output(QueueName::Active, out, &cfg(&["-w", "50"])).unwrap();
        assert_eq!(r.status(), Status::Warn);
        let out = "h\nTOTAL 0 60 700 0 0 0 0 0 0 0\n";
        let r = QueueResult::from_output(QueueName::Active, out, &cfg(&["-w", "50"])).unwrap();
        assert_eq!((r.surges.warn, r.surges.crit), (1, 1));
        assert_eq!(r.status(), Status::Crit);
    }

    #[test]
    fn locate_needs_exec_bit() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let tool = td.path().join("qshape");
        fs::write(&tool, "#!/bin/sh\n")?;
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o644))?;
        assert_eq!(locate(&tool), None);
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755))?;
        assert_eq!(locate(&tool), Some(tool.clone()));
        assert_eq!(locate(td.path()), None, "directories don't count");
        Ok(())
    }

    #[test]
    fn locate_in_path() {
        assert!(locate(Path::new("sh")).is_some());
        assert_eq!(locate(Path::new("no-such-qshape-binary")), None);
    }
}
