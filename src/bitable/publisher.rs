use super::BitableClient;
use crate::error::{Error, Result};
use crate::feed::{FeedFailure, NewsItem};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// The batch-create endpoint accepts at most this many records per call.
/// This system never chunks; a caller holding more must split upstream.
pub const MAX_BATCH_RECORDS: usize = 500;

/// Target table within a Bitable app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub app_token: String,
    pub table_id: String,
}

#[derive(Debug, Deserialize)]
struct BatchCreateResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<BatchCreateData>,
}

#[derive(Debug, Deserialize)]
struct BatchCreateData {
    #[serde(default)]
    records: Vec<Value>,
}

/// Batch writer for the remote tabular store. Callers treat every error as
/// log-and-continue; a rejected batch never fails the run.
#[derive(Debug, Clone, Copy)]
pub struct Publisher<'a> {
    client: &'a BitableClient,
}

impl<'a> Publisher<'a> {
    pub fn new(client: &'a BitableClient) -> Self {
        Self { client }
    }

    /// Push items as a single batch-create call, returning the number of
    /// records the server reports inserted. An empty input is a no-op.
    pub async fn publish(
        &self,
        token: &str,
        dest: &Destination,
        items: &[NewsItem],
    ) -> Result<usize> {
        if items.is_empty() {
            debug!("No records to push");
            return Ok(0);
        }

        let records: Vec<Value> = items.iter().map(item_record).collect::<Result<_>>()?;
        let inserted = self.batch_create(token, dest, records).await?;
        info!("Pushed {} records to table {}", inserted, dest.table_id);
        Ok(inserted)
    }

    /// Push feed-fetch failures to the error table. Same batch mechanics,
    /// separate destination; callers never escalate a failure here.
    pub async fn publish_failures(
        &self,
        token: &str,
        dest: &Destination,
        failures: &[FeedFailure],
    ) -> Result<usize> {
        if failures.is_empty() {
            return Ok(0);
        }

        info!("Pushing {} error logs to table {}", failures.len(), dest.table_id);
        let records: Vec<Value> = failures.iter().map(failure_record).collect();
        self.batch_create(token, dest, records).await
    }

    async fn batch_create(
        &self,
        token: &str,
        dest: &Destination,
        records: Vec<Value>,
    ) -> Result<usize> {
        let submitted = records.len();
        if submitted > MAX_BATCH_RECORDS {
            warn!(
                "Batch of {} exceeds the {}-record cap; the server may reject it",
                submitted, MAX_BATCH_RECORDS
            );
        }
        let url = self.client.endpoint(&format!(
            "/open-apis/bitable/v1/apps/{}/tables/{}/records/batch_create",
            dest.app_token, dest.table_id
        ));

        let response = self
            .client
            .http()
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "records": records }))
            .send()
            .await
            .map_err(|e| Error::Publish(format!("Batch create request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!(
                "Batch create returned HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let body: BatchCreateResponse = response
            .json()
            .await
            .map_err(|e| Error::Publish(format!("Failed to decode batch create response: {}", e)))?;

        if body.code != 0 {
            return Err(Error::Publish(format!(
                "Batch create rejected (code {}): {}",
                body.code, body.msg
            )));
        }

        let inserted = body
            .data
            .map(|d| d.records.len())
            .filter(|n| *n > 0)
            .unwrap_or(submitted);
        Ok(inserted)
    }
}

/// Map an item into the table schema. The date column expects a millisecond
/// epoch; the calendar date is interpreted as UTC midnight so the result
/// does not depend on the host timezone.
fn item_record(item: &NewsItem) -> Result<Value> {
    Ok(json!({
        "fields": {
            "Title": item.title,
            "Link": item.link,
            "Source": item.source,
            "Date": date_to_epoch_millis(&item.date)?,
            "Description": item.description,
        }
    }))
}

fn failure_record(failure: &FeedFailure) -> Value {
    json!({
        "fields": {
            "RssTitle": failure.source_name,
            "RssUrl": failure.source_url,
            "ErrorMessage": failure.error_message,
        }
    })
}

pub(crate) fn date_to_epoch_millis(date: &str) -> Result<i64> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| Error::Publish(format!("Invalid item date '{}': {}", date, e)))?;
    Ok(day.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(link: &str, date: &str) -> NewsItem {
        NewsItem {
            title: "存款新规发布".to_string(),
            link: link.to_string(),
            source: "X".to_string(),
            date: date.to_string(),
            description: "desc".to_string(),
        }
    }

    fn dest() -> Destination {
        Destination {
            app_token: "bascnAAA".to_string(),
            table_id: "tblBBB".to_string(),
        }
    }

    #[test]
    fn test_date_to_epoch_is_utc_midnight() {
        assert_eq!(date_to_epoch_millis("2024-01-01").unwrap(), 1_704_067_200_000);
        assert_eq!(date_to_epoch_millis("1970-01-01").unwrap(), 0);
        assert!(date_to_epoch_millis("01/02/2024").is_err());
    }

    #[tokio::test]
    async fn test_publish_sends_mapped_records() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/bitable/v1/apps/bascnAAA/tables/tblBBB/records/batch_create"))
            .and(header("authorization", "Bearer tok-1"))
            .and(body_partial_json(json!({
                "records": [{
                    "fields": {
                        "Title": "存款新规发布",
                        "Link": "http://a/1",
                        "Source": "X",
                        "Date": 1_704_067_200_000i64,
                        "Description": "desc"
                    }
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "success",
                "data": { "records": [{"record_id": "rec1"}] }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = BitableClient::with_base_url(mock_server.uri());
        let publisher = Publisher::new(&client);
        let count = publisher
            .publish("tok-1", &dest(), &[item("http://a/1", "2024-01-01")])
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_publish_empty_is_noop() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = BitableClient::with_base_url(mock_server.uri());
        let publisher = Publisher::new(&client);
        let count = publisher.publish("tok-1", &dest(), &[]).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_publish_http_error_is_publish_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&mock_server)
            .await;

        let client = BitableClient::with_base_url(mock_server.uri());
        let publisher = Publisher::new(&client);
        let result = publisher
            .publish("tok-1", &dest(), &[item("http://a/1", "2024-01-01")])
            .await;

        match result {
            Err(Error::Publish(msg)) => assert!(msg.contains("403")),
            other => panic!("expected Publish error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_application_code_is_publish_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 91402,
                "msg": "NOTEXIST"
            })))
            .mount(&mock_server)
            .await;

        let client = BitableClient::with_base_url(mock_server.uri());
        let publisher = Publisher::new(&client);
        let result = publisher
            .publish("tok-1", &dest(), &[item("http://a/1", "2024-01-01")])
            .await;
        assert!(matches!(result, Err(Error::Publish(_))));
    }

    #[tokio::test]
    async fn test_publish_failures_uses_error_schema() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/bitable/v1/apps/bascnERR/tables/tblERR/records/batch_create"))
            .and(body_partial_json(json!({
                "records": [{
                    "fields": {
                        "RssTitle": "Broken Feed",
                        "RssUrl": "http://broken/rss",
                        "ErrorMessage": "HTTP 500 for http://broken/rss"
                    }
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": { "records": [{}] }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = BitableClient::with_base_url(mock_server.uri());
        let publisher = Publisher::new(&client);
        let failures = vec![FeedFailure {
            source_name: "Broken Feed".to_string(),
            source_url: "http://broken/rss".to_string(),
            error_message: "HTTP 500 for http://broken/rss".to_string(),
        }];
        let count = publisher
            .publish_failures("tok-1", &error_dest(), &failures)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    fn error_dest() -> Destination {
        Destination {
            app_token: "bascnERR".to_string(),
            table_id: "tblERR".to_string(),
        }
    }
}
