//! 構造化ログの初期化。
//! tracing-subscriber を使用し、JSON またはテキスト形式で出力する。
//!
//! # 使用例
//!
//! ```ignore
//! sucrim_server_common::init_logger("dev", "text")?;
//! tracing::info!(service = "order-service", "起動しました");
//! ```

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 環境名に対応する既定のログレベル。
///
/// - dev: debug
/// - staging: info
/// - それ以外: warn
pub fn default_level(env: &str) -> &'static str {
    match env {
        "dev" => "debug",
        "staging" => "info",
        _ => "warn",
    }
}

/// init_logger はグローバルな tracing-subscriber を初期化する。
///
/// `RUST_LOG` が設定されていればそれを優先し、なければ環境名から既定レベルを決める。
/// format が "text" の場合はプレーンテキスト出力、それ以外は JSON 出力。
/// 既にサブスクライバーが登録済みの場合はエラーを返す。
pub fn init_logger(env: &str, format: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(env)));

    let registry = tracing_subscriber::registry().with(filter);

    if format == "text" {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(fmt::format::FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(fmt::format::FmtSpan::CLOSE),
            )
            .try_init()
    }
}
