/// ログ基盤モジュール
///
/// Lambda / 常駐プロセス共通の構造化ログ設定を提供する。
/// tracingクレートを使用し、JSON形式で出力する。
use std::sync::Once;

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// ログサブスクライバー初期化用の同期プリミティブ
static INIT: Once = Once::new();

/// 構造化ログのサブスクライバーを初期化する
///
/// JSON形式での出力を設定し、環境変数`RUST_LOG`または
/// デフォルトのログレベル（info）でフィルタリングを行う。
///
/// 複数回呼び出しても最初の呼び出しのみ初期化を実行する。
///
/// # 使用例
/// ```ignore
/// use functions::infrastructure::init_logging;
///
/// init_logging();
/// tracing::info!("関数を起動");
/// ```
pub fn init_logging() {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // テストなど既に別のサブスクライバーがある場合は何もしない
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer(std::io::stdout))
            .try_init();
    });
}

/// JSON形式のログレイヤー（CloudWatch / ログ収集向け）
///
/// イベントのフィールドはトップレベルに展開する。
fn json_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .flatten_event(true)
        .with_current_span(false)
}

/// テスト用のログサブスクライバーを初期化する（人間が読みやすい形式）
#[cfg(test)]
pub fn init_test_logging() {
    static TEST_INIT: Once = Once::new();

    TEST_INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_target(true)
            .compact();

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init();
    });
}

/// テスト用: 本番と同じJSON形式のログを溜めるバッファ
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl CapturedLogs {
    /// 出力済みのログを1行1レコードとして返す
    pub fn records(&self) -> Vec<serde_json::Value> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// 指定レベル（"ERROR"等）のレコードのみ返す
    pub fn at_level(&self, level: &str) -> Vec<serde_json::Value> {
        self.records()
            .into_iter()
            .filter(|record| record["level"] == level)
            .collect()
    }
}

#[cfg(test)]
impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// テスト用: 現在のスレッドのログをJSONで取り込む
///
/// ガードを保持している間だけ有効。current_threadランタイムでは
/// spawnしたタスクのログも取り込まれる。
#[cfg(test)]
pub fn capture_logs(level: &str) -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(json_layer(move || writer.clone()));
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
