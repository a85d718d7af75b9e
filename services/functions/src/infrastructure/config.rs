/// Supabase接続設定
///
/// プロジェクトURLとサービスロールキーを環境変数から読み込む。
use thiserror::Error;
use url::Url;

/// プロジェクトURLの環境変数名
pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";

/// サービスロールキーの環境変数名
pub const SUPABASE_SERVICE_ROLE_KEY_ENV: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// anonキーの環境変数名（通知転送のフォールバック用）
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

/// Realtimeプロトコルのバージョン
const REALTIME_VSN: &str = "1.0.0";

/// Supabase設定のエラー型
#[derive(Debug, Error)]
pub enum SupabaseConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid Supabase URL: {0}")]
    InvalidUrl(String),
}

/// Supabaseプロジェクトへの接続設定
///
/// - `url`: プロジェクトURL（例: "https://abcd.supabase.co"）
/// - `service_key`: サービスロールキー（管理APIの認可と`apikey`ヘッダーに使用）
#[derive(Clone)]
pub struct SupabaseConfig {
    url: String,
    service_key: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl SupabaseConfig {
    /// 明示的な値で設定を作成
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_key: service_key.into(),
        }
    }

    /// 環境変数から設定を読み込み（アカウント削除用）
    ///
    /// # 環境変数
    /// - `SUPABASE_URL`: プロジェクトURL（必須）
    /// - `SUPABASE_SERVICE_ROLE_KEY`: サービスロールキー（必須）
    pub fn from_env() -> Result<Self, SupabaseConfigError> {
        let url = required_env(SUPABASE_URL_ENV)?;
        let service_key = required_env(SUPABASE_SERVICE_ROLE_KEY_ENV)?;

        Self::validated(url, service_key)
    }

    /// 環境変数から設定を読み込み（通知転送用）
    ///
    /// サービスロールキーが無ければ`SUPABASE_ANON_KEY`を使う。
    pub fn from_env_with_anon_fallback() -> Result<Self, SupabaseConfigError> {
        let url = required_env(SUPABASE_URL_ENV)?;
        let service_key = required_env(SUPABASE_SERVICE_ROLE_KEY_ENV)
            .or_else(|_| required_env(SUPABASE_ANON_KEY_ENV))
            .map_err(|_| {
                SupabaseConfigError::MissingEnvVar(SUPABASE_SERVICE_ROLE_KEY_ENV.to_string())
            })?;

        Self::validated(url, service_key)
    }

    fn validated(url: String, service_key: String) -> Result<Self, SupabaseConfigError> {
        Url::parse(&url).map_err(|e| SupabaseConfigError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self::new(url, service_key))
    }

    /// プロジェクトURLを取得
    pub fn url(&self) -> &str {
        &self.url
    }

    /// サービスロールキーを取得
    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    /// GoTrue (auth/v1) のURLを構築
    pub fn auth_url(&self, path: &str) -> String {
        format!(
            "{}/auth/v1/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// PostgREST (rest/v1) のテーブルURLを構築
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.url.trim_end_matches('/'), table)
    }

    /// RealtimeのWebSocket URLを構築
    ///
    /// `https` → `wss`, `http` → `ws` に置き換え、`apikey`と`vsn`をクエリに付与する。
    pub fn realtime_url(&self) -> Result<Url, SupabaseConfigError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| SupabaseConfigError::InvalidUrl(format!("{}: {}", self.url, e)))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(SupabaseConfigError::InvalidUrl(format!(
                    "unsupported scheme: {}",
                    other
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| SupabaseConfigError::InvalidUrl(format!("cannot use scheme {}", scheme)))?;

        let path = format!("{}/realtime/v1/websocket", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.service_key)
            .append_pair("vsn", REALTIME_VSN);

        Ok(url)
    }
}

fn required_env(name: &str) -> Result<String, SupabaseConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SupabaseConfigError::MissingEnvVar(name.to_string()))
}
