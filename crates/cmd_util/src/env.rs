use std::{
    env,
    fmt::Debug,
    fs::File,
    io,
    path::PathBuf,
    str::FromStr,
};

use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    Layer,
    fmt::{
        MakeWriter,
        format::format,
    },
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Environment variable naming a file that receives a copy of all INFO and
/// above events, in addition to the regular writer.
pub const TRACE_FILE_VAR: &str = "PARALLEL_INDEX_TRACE_FILE";

/// Read a typed override for `name` from the environment, falling back to
/// `default` when the variable is unset or unparseable.
pub fn env_config<T: Debug + FromStr>(name: &str, default: T) -> T
where
    <T as FromStr>::Err: Debug,
{
    match env_config_opt(name) {
        Some(v) => v,
        None => default,
    }
}

/// Like [`env_config`] but without a default, for knobs whose absence is
/// meaningful.
pub fn env_config_opt<T: Debug + FromStr>(name: &str) -> Option<T>
where
    <T as FromStr>::Err: Debug,
{
    let var_s = match env::var(name) {
        Ok(s) => s,
        Err(env::VarError::NotPresent) => return None,
        Err(env::VarError::NotUnicode(..)) => {
            tracing::warn!("Invalid value for {name}, ignoring it.");
            return None;
        },
    };
    match T::from_str(var_s.trim()) {
        Ok(v) => {
            tracing::info!("Overriding {name} to {v:?} from environment");
            Some(v)
        },
        Err(e) => {
            tracing::warn!("Invalid value {var_s} for {name}, ignoring it: {e:?}");
            None
        },
    }
}

/// Guard object. Hold onto it for as long as events should keep flowing to
/// the file named by `PARALLEL_INDEX_TRACE_FILE`.
pub struct TracingGuard {
    _guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Call this from command line tools at startup.
pub fn config_tool() -> TracingGuard {
    config_tracing(io::stderr, Level::ERROR)
}

fn open_trace_file() -> Option<File> {
    let path = PathBuf::from(env::var_os(TRACE_FILE_VAR)?);
    match File::create(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Could not create trace file {}: {e}", path.display());
            None
        },
    }
}

fn config_tracing<W>(writer: W, level: Level) -> TracingGuard
where
    W: Send + Sync + for<'writer> MakeWriter<'writer> + 'static,
{
    let mut layers = Vec::new();
    let color_disabled = env::var("NO_COLOR").is_ok();
    let format_layer = tracing_subscriber::fmt::layer()
        .with_ansi(!color_disabled)
        .with_writer(writer);
    let format_layer = match env::var("LOG_FORMAT") {
        Ok(s) if s == "json" => format_layer.event_format(format().json()).boxed(),
        Ok(s) if s == "pretty" => format_layer.event_format(format().pretty()).boxed(),
        _ => format_layer.event_format(format().compact()).boxed(),
    };
    let format_layer = format_layer
        .with_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(level.as_str())))
        .boxed();
    layers.push(format_layer);

    let guard = if let Some(file) = open_trace_file() {
        let (file_writer, guard) = tracing_appender::non_blocking(file);
        let file_writer_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
            .boxed();
        layers.push(file_writer_layer);
        Some(guard)
    } else {
        None
    };
    // Ignore the error: a subscriber installed earlier in the process wins.
    let _ = tracing_subscriber::registry().with(layers).try_init();

    TracingGuard { _guard: guard }
}

pub fn config_test() {
    // Try to initialize tracing_subcriber. Ok if it fails - probably
    // means it was initialized already by another test.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::{
        env_config,
        env_config_opt,
    };

    // Each test uses its own variable so they can run in parallel.
    #[test]
    fn test_env_config_default_when_unset() {
        assert_eq!(env_config("CMD_UTIL_TEST_UNSET_KNOB", 7usize), 7);
        assert_eq!(env_config_opt::<usize>("CMD_UTIL_TEST_UNSET_KNOB"), None);
    }

    #[test]
    fn test_env_config_override() {
        unsafe { std::env::set_var("CMD_UTIL_TEST_OVERRIDE_KNOB", " 12 ") };
        assert_eq!(env_config("CMD_UTIL_TEST_OVERRIDE_KNOB", 3usize), 12);
    }

    #[test]
    fn test_env_config_invalid_falls_back() {
        unsafe { std::env::set_var("CMD_UTIL_TEST_INVALID_KNOB", "twelve") };
        assert_eq!(env_config("CMD_UTIL_TEST_INVALID_KNOB", 3usize), 3);
        assert!(!env_config("CMD_UTIL_TEST_INVALID_KNOB", false));
    }
}
