use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "cloudbox_client=info";

static INIT: OnceCell<()> = OnceCell::new();

/// 安装 fmt 日志订阅者，`RUST_LOG` 优先；重复调用或宿主已安装订阅者时静默跳过。
pub fn init_logging() {
    INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        if fmt().with_env_filter(filter).try_init().is_err() {
            eprintln!("[logging] a global subscriber is already installed; keeping it");
        }
    });
}
