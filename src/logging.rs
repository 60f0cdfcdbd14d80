//! Logging backend which writes to a file on a background thread.

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::{mpsc, Mutex},
};

use chrono::Local;
use eyre::{Result, WrapErr};
use log::{Level, LevelFilter, Metadata, Record};
use once_cell::sync::OnceCell;

struct Message {
    module: String,
    level: Level,
    string: String,
    time: String,
}

impl Message {
    fn write_to_file(&self, file: &mut File) {
        let level_name = match self.level {
            Level::Error => "error",
            Level::Warn => "warning",
            Level::Info => "info",
            Level::Debug | Level::Trace => "debug",
        };

        //      [date time] [module] [level] Text
        let _ = file.write_fmt(format_args!(
            "[{}] [{}] [{}] {}\n",
            self.time, self.module, level_name, self.string
        ));
    }
}

struct Logger;

impl Logger {
    fn commit(&self, record: &Record) {
        let module = record
            .module_path()
            .and_then(|path| path.split("::").last())
            .unwrap_or("unknown");

        let message = Message {
            module: module.to_string(),
            level: record.level(),
            string: format!("{}", record.args()),
            time: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        };

        if let Some(sender) = MSG_SENDER.get() {
            // If the writer thread has gone there is nowhere left to report the failure.
            let _ = sender.lock().map(|sender| sender.send(message));
        }
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.commit(record);
        }
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;
static MSG_SENDER: OnceCell<Mutex<mpsc::Sender<Message>>> = OnceCell::new();
static PANIC_PATH: OnceCell<PathBuf> = OnceCell::new();

fn panic_hook(info: &std::panic::PanicInfo) {
    let message = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "no message".to_string());

    let location = info
        .location()
        .map(|location| location.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let time = Local::now();
    let backtrace = std::backtrace::Backtrace::force_capture();

    let info_dump = format!(
        "The spell patcher panicked.

Message: {message}
Location: {location}
Time: {time}
Backtrace: see below

{backtrace}"
    );

    log::error!("{info_dump}");

    if let Some(path) = PANIC_PATH.get() {
        let _ = std::fs::write(path, info_dump);
    }
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        previous(info);
    }));
}

/// Starts logging to the file at `path`, replacing anything already in it. Panics are logged and
/// also written to `PANIC.txt` in the same directory.
///
/// Logging can only be started once per process.
pub fn init(path: impl AsRef<Path>, level: LevelFilter) -> Result<()> {
    let path = path.as_ref();

    let mut file = File::create(path)
        .wrap_err_with(|| format!("failed to create log file {}", path.display()))?;

    let (sender, receiver) = mpsc::channel::<Message>();

    MSG_SENDER
        .set(Mutex::new(sender))
        .map_err(|_| eyre::format_err!("logging has already been initialised"))?;

    log::set_logger(&LOGGER)
        .map_err(|err| eyre::format_err!("another logger is already installed: {}", err))?;
    log::set_max_level(level);

    let panic_path = path
        .parent()
        .map_or_else(|| PathBuf::from("PANIC.txt"), |dir| dir.join("PANIC.txt"));

    let _ = PANIC_PATH.set(panic_path);
    install_panic_hook();

    // Writing happens on a background thread so that logging doesn't slow down the game. The
    // thread stops when the sender is dropped, which only happens at exit.
    std::thread::Builder::new()
        .name("spellpatch-log".to_string())
        .spawn(move || {
            for message in receiver {
                message.write_to_file(&mut file);
            }
        })
        .wrap_err("failed to start the log writer thread")?;

    log::info!("Logging started at level {level}");

    Ok(())
}
