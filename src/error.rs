use thiserror::Error;

/// タイムシート作成時に発生するエラー。
#[derive(Debug, Error)]
pub enum FastBillError {
    /// 年月の文字列が`YYYY-MM`形式ではない。
    #[error("Invalid month '{0}', expected YYYY-MM")]
    Format(String),

    /// FastBill APIへの接続に失敗した。
    #[error("Failed to connect to FastBill API at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// FastBill APIのレスポンスが想定した形式ではない。
    #[error("Unexpected response from FastBill API: {0}")]
    Protocol(String),

    /// 認証情報がFastBill APIに拒否された。
    #[error("FastBill API rejected the credentials: {0}")]
    Auth(String),

    /// タイムエントリーの内容が不正。
    #[error("Invalid time entry: {0}")]
    Validation(String),

    #[error("Failed to render PDF: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
