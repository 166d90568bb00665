use async_trait::async_trait;
use log::{debug, info};
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::Serialize;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::config::Config;
use crate::error::FastBillError;
use crate::month::YearMonth;
use crate::time_entry::TimeEntry;

/// FastBill APIのデフォルトのエンドポイント。
pub const DEFAULT_API_URL: &str = "https://my.fastbill.com/api/1.0/api.php";

/// タイムエントリーを取得するサービス名。
const TIME_SERVICE: &str = "time.get";

/// 1回のリクエストで取得するタイムエントリーの件数。
const PAGE_SIZE: usize = 100;

/// タイムエントリーを取得する条件。
#[derive(Clone, Debug, PartialEq)]
pub struct TimeEntryQuery {
    pub month: YearMonth,
    pub customer_id: Option<String>,
    pub project_id: Option<String>,
}

/// タイムエントリーを取得するためのtrait。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TimeEntryRepository {
    /// 条件に一致する全てのタイムエントリーを、APIが返した順序のまま取得する。
    ///
    /// # Arguments
    ///
    /// * `query` - 対象の年月と、任意の顧客ID・プロジェクトID
    async fn read_time_entries(
        &self,
        query: &TimeEntryQuery,
    ) -> Result<Vec<TimeEntry>, FastBillError>;
}

/// FastBill APIへのリクエストボディ。
#[derive(Debug, Serialize)]
struct FastBillRequest<'a> {
    #[serde(rename = "SERVICE")]
    service: &'a str,
    #[serde(rename = "Filter")]
    filter: &'a TimeFilter,
    #[serde(rename = "OFFSET")]
    offset: usize,
    #[serde(rename = "LIMIT")]
    limit: usize,
}

/// `time.get`の検索条件。
#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct TimeFilter {
    start_date: String,
    end_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<String>,
}

impl From<&TimeEntryQuery> for TimeFilter {
    fn from(query: &TimeEntryQuery) -> Self {
        Self {
            start_date: query.month.first_day().format("%Y-%m-%d").to_string(),
            end_date: query.month.last_day().format("%Y-%m-%d").to_string(),
            customer_id: query.customer_id.clone(),
            project_id: query.project_id.clone(),
        }
    }
}

/// FastBill APIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = FastBillClient::new(&config);
/// let time_entries = client.read_time_entries(&query).await.unwrap();
/// ```
pub struct FastBillClient {
    client: Client,
    api_url: String,
    api_user: String,
    api_key: String,
}

impl FastBillClient {
    /// 新しい`FastBillClient`を返す。
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.clone(),
            api_user: config.api_user.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// 指定されたオフセットから1ページ分のタイムエントリーを取得する。
    async fn post_page(
        &self,
        filter: &TimeFilter,
        offset: usize,
    ) -> Result<Vec<TimeEntry>, FastBillError> {
        let request = FastBillRequest {
            service: TIME_SERVICE,
            filter,
            offset,
            limit: PAGE_SIZE,
        };
        let connection_error = |source| FastBillError::Connection {
            url: self.api_url.clone(),
            source,
        };

        let response = self
            .client
            .post(&self.api_url)
            .basic_auth(&self.api_user, Some(&self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(connection_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FastBillError::Auth(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(FastBillError::Protocol(format!(
                "request returned status {}",
                status
            )));
        }

        let body = response.text().await.map_err(connection_error)?;
        let collection = unwrap_envelope(&body)?;

        serde_json::from_value(collection).map_err(|e| {
            FastBillError::Protocol(format!("Failed to deserialize time entries: {}", e))
        })
    }
}

#[async_trait]
impl TimeEntryRepository for FastBillClient {
    /// 指定された月のタイムエントリーをページングしながら全て取得する。
    ///
    /// 取得件数がページサイズと等しい間は、オフセットを進めて次のページを要求する。
    async fn read_time_entries(
        &self,
        query: &TimeEntryQuery,
    ) -> Result<Vec<TimeEntry>, FastBillError> {
        let filter = TimeFilter::from(query);
        info!(
            "Start date: {}, End date: {}",
            filter.start_date, filter.end_date
        );

        let mut time_entries = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.post_page(&filter, offset).await?;
            let page_len = page.len();
            debug!("Received {} time entries at offset {}", page_len, offset);

            time_entries.extend(page);
            if page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        info!("Length of time entries: {}", time_entries.len());

        Ok(time_entries)
    }
}

/// レスポンスの`RESPONSE`から唯一の結果コレクションを取り出す。
///
/// `RESPONSE`のキー名はサービスごとに異なるため名前では参照せず、
/// キーがちょうど1つであることだけを確認する。
fn unwrap_envelope(body: &str) -> Result<Value, FastBillError> {
    let mut document: Value = serde_json::from_str(body)
        .map_err(|e| FastBillError::Protocol(format!("response is not JSON: {}", e)))?;

    let envelope = match document.get_mut("RESPONSE").map(Value::take) {
        Some(Value::Object(envelope)) => envelope,
        Some(other) => {
            return Err(FastBillError::Protocol(format!(
                "RESPONSE is not an object: {}",
                other
            )))
        }
        None => {
            return Err(FastBillError::Protocol(
                "missing RESPONSE envelope".to_string(),
            ))
        }
    };

    if envelope.len() != 1 {
        let keys = envelope.keys().cloned().collect::<Vec<_>>();
        return Err(FastBillError::Protocol(format!(
            "expected exactly one result collection in RESPONSE, found {} [{}]",
            keys.len(),
            keys.join(", ")
        )));
    }

    let (key, collection) = envelope.into_iter().next().ok_or_else(|| {
        FastBillError::Protocol("RESPONSE envelope is empty".to_string())
    })?;
    if key == "ERRORS" {
        return Err(FastBillError::Protocol(format!(
            "service returned errors: {}",
            error_messages(&collection)
        )));
    }
    debug!("Unwrapped RESPONSE.{}", key);

    Ok(collection)
}

/// `ERRORS`の値を1行のメッセージにまとめる。
fn error_messages(errors: &Value) -> String {
    match errors {
        Value::Array(messages) => messages
            .iter()
            .map(|message| match message {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}
