// テスト用フェイクHTTPサーバー
//
// Supabase / OAuth / FCM のエンドポイントを127.0.0.1上のaxumで立て、
// 受信したリクエストを記録する。

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::routing::{MethodRouter, any};
use std::sync::{Arc, Mutex};

/// 記録されたリクエスト
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: String,
}

impl RecordedRequest {
    /// ヘッダー値を文字列で取得
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// 受信リクエストの記録
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, method: Method, uri: Uri, headers: HeaderMap, body: String) {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            headers,
            body,
        });
    }

    /// 記録済みリクエストの一覧
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// 記録件数
    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// 固定のステータスとJSON本文を返し、リクエストを記録するルート
pub fn respond_with(recorder: &Recorder, status: StatusCode, body: &'static str) -> MethodRouter {
    let recorder = recorder.clone();
    any(
        move |method: Method, uri: Uri, headers: HeaderMap, request_body: String| {
            let recorder = recorder.clone();
            async move {
                recorder.record(method, uri, headers, request_body);
                (status, [(CONTENT_TYPE, "application/json")], body)
            }
        },
    )
}

/// ルーターを空きポートで起動し、ベースURLを返す
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("テストサーバーのバインドに失敗");
    let addr = listener.local_addr().expect("ローカルアドレスの取得に失敗");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("テストサーバーの起動に失敗");
    });

    format!("http://{}", addr)
}
