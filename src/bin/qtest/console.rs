use std::collections::VecDeque;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use str_queue::{FaultyAlloc, Queue, QueueError, QueueHandle};
use tracing::{debug, warn};
use tracing_subscriber::{reload, EnvFilter, Registry};

const MAX_SOURCE_DEPTH: usize = 8;

const HELP: &str = "\
Commands:
  new                 create a new, empty queue
  free                destroy the queue
  ih <str> [n]        insert <str> at the head n times (default 1)
  it <str> [n]        insert <str> at the tail n times (default 1)
  rh [str]            remove from head, optionally comparing with <str>
  rhq                 remove from head without reporting the value
  size [n]            compute queue size n times (default 1)
  reverse             reverse the queue in place
  sort                sort the queue in ascending order
  show                print the queue
  option              list option values
  option fail <pct>   make allocations fail with the given probability
  option length <n>   set the capacity of the removal buffer
  option verbose <n>  set log verbosity (0 warn, 1 info, 2 debug, 3 trace)
  source <file>       run commands from a file
  help                show this message
  quit                exit";

pub type LogHandle = reload::Handle<EnvFilter, Registry>;

pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[derive(Clone)]
pub struct Config {
    pub fail_percent: u32,
    pub seed: u64,
    pub length: usize,
    pub echo: bool,
    pub verbose: u8,
    pub log: Option<LogHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

// Runs queue commands and checks every result against a plain
// `VecDeque` holding what the queue should contain.
pub struct Console<W> {
    out: W,
    alloc: FaultyAlloc,
    queue: Option<Queue<FaultyAlloc>>,
    model: Option<VecDeque<String>>,
    length: usize,
    echo: bool,
    verbose: u8,
    log: Option<LogHandle>,
    errors: usize,
    depth: usize,
}

impl<W: Write> Console<W> {
    pub fn new(config: Config, out: W) -> Self {
        let alloc = FaultyAlloc::new(config.seed);
        alloc.set_fail_percent(config.fail_percent);
        Self {
            out,
            alloc,
            queue: None,
            model: None,
            length: config.length,
            echo: config.echo,
            verbose: config.verbose,
            log: config.log,
            errors: 0,
            depth: 0,
        }
    }

    pub fn run<R: BufRead>(&mut self, input: R) -> Result<Flow> {
        for line in input.lines() {
            let line = line.context("failed to read command")?;
            if self.echo {
                writeln!(self.out, "cmd> {}", line)?;
            }
            match self.execute(&line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => return Ok(Flow::Quit),
                Err(err) => self.error(format_args!("{:#}", err))?,
            }
        }
        Ok(Flow::Continue)
    }

    pub fn run_file(&mut self, path: &Path) -> Result<Flow> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        self.run(BufReader::new(file))
    }

    pub fn finish(&mut self) -> Result<usize> {
        if self.queue.is_some() {
            self.free()?;
        }
        self.out.flush()?;
        Ok(self.errors)
    }

    fn error(&mut self, msg: impl Display) -> Result<()> {
        warn!(%msg, "command failed");
        self.errors += 1;
        writeln!(self.out, "ERROR: {}", msg)?;
        Ok(())
    }

    pub fn execute(&mut self, line: &str) -> Result<Flow> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(Flow::Continue);
        }
        let args: Vec<&str> = line.split_whitespace().collect();
        debug!(?args, "executing");

        match args.as_slice() {
            ["new"] => self.new_queue()?,
            ["free"] => self.free()?,
            [cmd @ ("ih" | "it"), value, rest @ ..] => {
                let count = parse_count(rest)?;
                self.insert(*cmd == "ih", value, count)?
            }
            ["rh"] => self.remove(None)?,
            ["rh", expected] => self.remove(Some(*expected))?,
            ["rhq"] => self.remove_quiet()?,
            ["size", rest @ ..] => {
                let count = parse_count(rest)?;
                self.size(count)?
            }
            ["reverse"] => self.reverse()?,
            ["sort"] => self.sort()?,
            ["show"] => self.show()?,
            ["option"] => self.list_options()?,
            ["option", name, value] => self.set_option(name, value)?,
            ["source", path] => return self.source(Path::new(path)),
            ["help"] => writeln!(self.out, "{}", HELP)?,
            ["quit"] => return Ok(Flow::Quit),
            [cmd, ..] => bail!("unknown command or bad arguments: '{}'", cmd),
            [] => {}
        }
        Ok(Flow::Continue)
    }

    fn new_queue(&mut self) -> Result<()> {
        if self.queue.is_some() {
            self.free()?;
        }
        self.queue = Some(Queue::new_in(self.alloc.clone()));
        self.model = Some(VecDeque::new());
        self.show()
    }

    fn free(&mut self) -> Result<()> {
        self.queue.destroy();
        self.model = None;
        let live = self.alloc.live_blocks();
        if live != 0 {
            self.error(format_args!(
                "freed queue, but {} blocks are still allocated",
                live
            ))?;
        }
        self.show()
    }

    fn insert(&mut self, at_head: bool, value: &str, count: usize) -> Result<()> {
        for _ in 0..count {
            let res = if at_head {
                self.queue.insert_head(value)
            } else {
                self.queue.insert_tail(value)
            };
            match res {
                Ok(()) => {
                    if let Some(model) = &mut self.model {
                        if at_head {
                            model.push_front(value.to_owned());
                        } else {
                            model.push_back(value.to_owned());
                        }
                    }
                }
                Err(QueueError::Alloc { .. }) if self.alloc.fail_percent() > 0 => {
                    writeln!(self.out, "WARNING: insertion of {} failed", value)?;
                }
                Err(err) => {
                    self.error(format_args!("insertion of {} failed: {}", value, err))?;
                    break;
                }
            }
        }
        self.check()?;
        self.show()
    }

    fn remove(&mut self, expected: Option<&str>) -> Result<()> {
        let mut buf = vec![0u8; self.length];
        match self.queue.remove_head(Some(&mut buf[..])) {
            Ok(n) => {
                let removed = String::from_utf8_lossy(&buf[..n]).into_owned();
                if let Some(model) = &mut self.model {
                    model.pop_front();
                }
                writeln!(self.out, "Removed {} from queue", removed)?;
                if let Some(expected) = expected {
                    if removed != expected {
                        self.error(format_args!(
                            "removed value {} does not match expected value {}",
                            removed, expected
                        ))?;
                    }
                }
            }
            Err(err) => self.error(format_args!("removal from queue failed: {}", err))?,
        }
        self.check()?;
        self.show()
    }

    fn remove_quiet(&mut self) -> Result<()> {
        match self.queue.remove_head(None) {
            Ok(_) => {
                if let Some(model) = &mut self.model {
                    model.pop_front();
                }
                writeln!(self.out, "Removed element from queue")?;
            }
            Err(err) => self.error(format_args!("removal from queue failed: {}", err))?,
        }
        self.check()?;
        self.show()
    }

    fn size(&mut self, count: usize) -> Result<()> {
        let expected = self.model.as_ref().map_or(0, |model| model.len());
        for _ in 0..count {
            let size = self.queue.size();
            if size != expected {
                return self.error(format_args!(
                    "computed size {}, but queue holds {} elements",
                    size, expected
                ));
            }
        }
        writeln!(self.out, "Queue size = {}", expected)?;
        Ok(())
    }

    fn reverse(&mut self) -> Result<()> {
        self.queue.reverse();
        if let Some(model) = &mut self.model {
            model.make_contiguous().reverse();
        }
        self.check()?;
        self.show()
    }

    fn sort(&mut self) -> Result<()> {
        self.queue.sort();
        if let Some(model) = &mut self.model {
            model.make_contiguous().sort();
        }
        self.check()?;
        self.show()
    }

    fn show(&mut self) -> Result<()> {
        match &self.queue {
            None => writeln!(self.out, "q = NULL")?,
            Some(queue) => writeln!(self.out, "q = {:?}", queue)?,
        }
        Ok(())
    }

    // Both sides render as `Some(["a", "b"])` or `None`.
    fn check(&mut self) -> Result<()> {
        let actual = format!("{:?}", self.queue);
        let expected = format!("{:?}", self.model);
        if actual != expected {
            self.error(format_args!(
                "queue holds {}, expected {}",
                actual, expected
            ))?;
        }
        Ok(())
    }

    fn list_options(&mut self) -> Result<()> {
        writeln!(self.out, "fail = {}", self.alloc.fail_percent())?;
        writeln!(self.out, "length = {}", self.length)?;
        writeln!(self.out, "verbose = {}", self.verbose)?;
        Ok(())
    }

    fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "fail" => {
                let percent: u32 = value
                    .parse()
                    .with_context(|| format!("invalid percentage '{}'", value))?;
                if percent > 100 {
                    bail!("percentage {} is not in 0..=100", percent);
                }
                self.alloc.set_fail_percent(percent);
            }
            "length" => {
                self.length = value
                    .parse()
                    .with_context(|| format!("invalid length '{}'", value))?;
            }
            "verbose" => {
                let verbose: u8 = value
                    .parse()
                    .with_context(|| format!("invalid verbosity '{}'", value))?;
                if let Some(log) = &self.log {
                    log.reload(EnvFilter::new(log_level(verbose)))
                        .context("failed to change log level")?;
                }
                self.verbose = verbose;
            }
            _ => bail!("unknown option '{}'", name),
        }
        Ok(())
    }

    fn source(&mut self, path: &Path) -> Result<Flow> {
        if self.depth >= MAX_SOURCE_DEPTH {
            bail!("source files nested deeper than {}", MAX_SOURCE_DEPTH);
        }
        self.depth += 1;
        let flow = self.run_file(path);
        self.depth -= 1;
        flow
    }
}

fn parse_count(args: &[&str]) -> Result<usize> {
    match args {
        [] => Ok(1),
        [n] => n
            .parse()
            .with_context(|| format!("invalid count '{}'", n)),
        _ => bail!("too many arguments"),
    }
}

#[cfg(test)]
mod test {
    use super::{log_level, Config, Console, Flow};

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::{reload, EnvFilter, Registry};

    fn config() -> Config {
        Config {
            fail_percent: 0,
            seed: 0,
            length: 1024,
            echo: false,
            verbose: 0,
            log: None,
        }
    }

    fn console() -> Console<Vec<u8>> {
        Console::new(config(), Vec::new())
    }

    fn run(console: &mut Console<Vec<u8>>, script: &str) -> (Flow, String) {
        let flow = console.run(script.as_bytes()).unwrap();
        let out = String::from_utf8(std::mem::take(&mut console.out)).unwrap();
        (flow, out)
    }

    #[test]
    fn test_console_scenario() {
        let mut c = console();
        let (flow, out) = run(
            &mut c,
            "\
# example session
new
it banana
it apple
ih cherry
size
sort
reverse
rh cherry
rh banana
size
show
",
        );
        assert_eq!(flow, Flow::Continue);
        assert!(out.contains(r#"q = ["cherry", "banana", "apple"]"#));
        assert!(out.contains(r#"q = ["apple", "banana", "cherry"]"#));
        assert!(out.contains("Removed cherry from queue"));
        assert!(out.contains("Queue size = 1"));
        assert!(out.ends_with("q = [\"apple\"]\n"));
        assert_eq!(c.finish().unwrap(), 0);
    }

    #[test]
    fn test_console_errors() {
        let mut c = console();
        let (_, out) = run(&mut c, "ih x\nnew\nrh\nit a\nrh b\nbogus\nih a zz\n");
        assert!(out.contains("ERROR: insertion of x failed: no queue instance"));
        assert!(out.contains("ERROR: removal from queue failed: queue is empty"));
        assert!(out.contains("ERROR: removed value a does not match expected value b"));
        assert!(out.contains("ERROR: unknown command or bad arguments: 'bogus'"));
        assert!(out.contains("ERROR: invalid count 'zz'"));
        assert_eq!(c.finish().unwrap(), 5);
    }

    #[test]
    fn test_console_repeat_and_quit() {
        let mut c = console();
        let (flow, out) = run(&mut c, "new\nih a 3\nit b 2\nsize 10\nquit\nih never\n");
        assert_eq!(flow, Flow::Quit);
        assert!(out.contains(r#"q = ["a", "a", "a", "b", "b"]"#));
        assert!(out.contains("Queue size = 5"));
        assert!(!out.contains("never"));
        assert_eq!(c.finish().unwrap(), 0);
    }

    #[test]
    fn test_console_truncates_removal() {
        let mut c = console();
        let (_, out) = run(&mut c, "new\nit abcdef\noption length 4\nrh abc\nrhq\n");
        assert!(out.contains("Removed abc from queue"));
        assert!(out.contains("ERROR: removal from queue failed: queue is empty"));
        assert_eq!(c.finish().unwrap(), 1);
    }

    #[test]
    fn test_console_injected_failures() {
        let mut c = console();
        let (_, out) = run(&mut c, "new\nit keep\noption fail 100\nih lost\nit lost\noption fail 0\nit kept\nfree\n");
        assert!(out.contains("WARNING: insertion of lost failed"));
        assert!(out.contains(r#"q = ["keep", "kept"]"#));
        assert!(out.ends_with("q = NULL\n"));
        assert_eq!(c.finish().unwrap(), 0);
    }

    #[test]
    fn test_console_random_failures_stay_consistent() {
        let mut c = console();
        let (_, out) = run(
            &mut c,
            "new\noption fail 40\nih a 20\nit b 20\nsort\nreverse\nrh\nrh\nsize\noption fail 0\nfree\n",
        );
        assert!(!out.contains("ERROR"));
        assert_eq!(c.finish().unwrap(), 0);
    }

    #[test]
    fn test_console_missing_source() {
        let mut c = console();
        let (_, out) = run(&mut c, "source /nonexistent/qtest/script.cmd\n");
        assert!(out.contains("ERROR: failed to open /nonexistent/qtest/script.cmd"));
        assert_eq!(c.finish().unwrap(), 1);
    }

    #[test]
    fn test_console_verbose_option() {
        let mut c = console();
        let (_, out) = run(&mut c, "option verbose 2\noption verbose x\n");
        assert_eq!(c.verbose, 2);
        assert!(out.contains("ERROR: invalid verbosity 'x'"));
        assert_eq!(c.finish().unwrap(), 1);

        let mut c = console();
        let (_, out) = run(&mut c, "option verbose 2\noption length 16\noption\n");
        assert!(!out.contains("ERROR"));
        assert!(out.ends_with("fail = 0\nlength = 16\nverbose = 2\n"));
        assert_eq!(c.finish().unwrap(), 0);
    }

    #[test]
    fn test_console_verbose_reloads_filter() {
        let (filter, handle) = reload::Layer::new(EnvFilter::new(log_level(0)));
        let _subscriber = Registry::default().with(filter);

        let mut c = Console::new(
            Config {
                log: Some(handle.clone()),
                ..config()
            },
            Vec::new(),
        );
        let (_, out) = run(&mut c, "option verbose 3\nnew\nit a\n");
        assert!(!out.contains("ERROR"));
        assert_eq!(c.verbose, 3);
        let level = handle.with_current(|filter| filter.to_string()).unwrap();
        assert_eq!(level, "trace");
        assert_eq!(c.finish().unwrap(), 0);
    }

    #[test]
    fn test_console_fail_option_range() {
        let mut c = console();
        let (_, out) = run(&mut c, "option fail 101\noption fail 100\nnew\nih a\n");
        assert!(out.contains("ERROR: percentage 101 is not in 0..=100"));
        assert!(out.contains("WARNING: insertion of a failed"));
        assert_eq!(c.alloc.fail_percent(), 100);
        assert_eq!(c.finish().unwrap(), 1);
    }
}
