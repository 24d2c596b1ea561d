//! 观测性初始化：控制台输出，可选按日滚动的文件日志。

pub mod events;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

pub fn init_tracing() {
    let _ = init_tracing_with_log_dir(None::<&Path>);
}

/// 返回的 guard 必须由调用方持有，否则文件写入线程会提前退出。
pub fn init_tracing_with_log_dir<P: AsRef<Path>>(log_dir: Option<P>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir.as_ref(), "pitchcoach-core.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer);

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set global subscriber: {err}");
    }

    guard
}
