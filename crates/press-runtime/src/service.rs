//! Request service over stored uploads.
//!
//! [`PressService`] owns the upload store and the table cache and exposes one
//! method per operation of the pipeline. Each returns a typed [`Result`];
//! [`ServiceResponse`] turns such a result into the JSON body handed to a
//! caller, logging internal failures and replacing their message with a
//! generic one.

use std::path::PathBuf;
use std::sync::Arc;

use press_core::models::{Cell, RecordTable};
use press_core::normalize::to_wire;
use press_core::outliers::DEFAULT_LEVEL;
use press_core::settings::RequestKind;
use press_core::{PressError, Result};
use press_data::analysis::{
    self, AnalysisView, ErrorStatsView, OutlierOptions, PlotDataView,
};
use press_data::reader::{read_validated_csv, table_from_json_rows};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::cache::TableCache;
use crate::store::UploadStore;

/// Message returned in place of the detail of any internal failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

// ── Requests ──────────────────────────────────────────────────────────────────

/// Plot data for rows a client already holds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotRequest {
    pub session_data: Vec<Map<String, Value>>,
    #[serde(default)]
    pub remove_outliers: bool,
    #[serde(default = "default_level", deserialize_with = "level_from_json")]
    pub outlier_level: i32,
}

/// Status label frequencies for rows a client already holds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStatsRequest {
    pub session_data: Vec<Map<String, Value>>,
}

/// Selects one press of a stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PressQuery {
    pub filename: String,
    #[serde(deserialize_with = "sn_from_json")]
    pub sn: String,
}

fn default_level() -> i32 {
    DEFAULT_LEVEL
}

/// Accepts `2`, `2.0` and `"2"`. Fractional numbers truncate toward zero.
fn level_from_json<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_level(&value)
        .ok_or_else(|| D::Error::custom(format!("outlierLevel must be an integer, got {value}")))
}

fn parse_level(value: &Value) -> Option<i32> {
    let level = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        })?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    i32::try_from(level).ok()
}

fn sn_from_json<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        value @ Value::Number(_) => Cell::from_json(&value)
            .key_string()
            .ok_or_else(|| D::Error::custom("sn must be a string or number")),
        other => Err(D::Error::custom(format!(
            "sn must be a string or number, got {other}"
        ))),
    }
}

fn parse_request<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| PressError::InvalidRequest(e.to_string()))
}

// ── Responses ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Internal,
}

/// Body of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

/// Outcome of a request: the view itself, or a tagged error body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServiceResponse<T> {
    Ok(T),
    Err(ErrorBody),
}

impl ServiceResponse<Value> {
    /// Normalize a successful view to wire JSON, or classify the error.
    pub fn respond<T: Serialize>(result: Result<T>) -> Self {
        match result.and_then(|view| to_wire(&view)) {
            Ok(value) => ServiceResponse::Ok(value),
            Err(err) => ServiceResponse::Err(error_body(err)),
        }
    }
}

impl<T> ServiceResponse<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, ServiceResponse::Ok(_))
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            ServiceResponse::Ok(_) => None,
            ServiceResponse::Err(body) => Some(body),
        }
    }
}

fn error_body(err: PressError) -> ErrorBody {
    if err.is_validation() {
        debug!(error = %err, "request rejected");
        ErrorBody {
            error: err.to_string(),
            kind: ErrorKind::Validation,
        }
    } else {
        error!(error = %err, detail = ?err, "request failed");
        ErrorBody {
            error: INTERNAL_ERROR_MESSAGE.to_string(),
            kind: ErrorKind::Internal,
        }
    }
}

// ── PressService ──────────────────────────────────────────────────────────────

/// Entry point for every pipeline operation.
///
/// # Example
/// ```no_run
/// use press_runtime::service::PressService;
///
/// let service = PressService::open("/tmp/uploads").unwrap();
/// let _view = service.upload("presses.csv", b"sn,...").unwrap();
/// ```
pub struct PressService {
    store: UploadStore,
    cache: TableCache,
}

impl PressService {
    pub fn new(store: UploadStore) -> Self {
        Self {
            store,
            cache: TableCache::new(),
        }
    }

    /// Service over the upload directory `root`, created if missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(UploadStore::open(root)?))
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    // ── Operations ────────────────────────────────────────────────────────

    /// Store `content` as `filename`, parse it and analyse it.
    ///
    /// The content is validated before it is written, so a rejected file
    /// never replaces an earlier upload of the same name.
    pub fn upload(&self, filename: &str, content: &[u8]) -> Result<AnalysisView> {
        self.store.path_for(filename)?;
        let text = std::str::from_utf8(content)
            .map_err(|_| PressError::InvalidRequest("file is not valid UTF-8".to_string()))?;
        let table = read_validated_csv(text)?;
        self.store.save(filename, content)?;
        let table = self.cache.insert(filename, table);
        info!(filename, rows = table.len(), "upload analysed");
        analysis::analyze_upload(&table, filename)
    }

    /// Parsed table of a stored upload, loading it on first use.
    pub fn table(&self, filename: &str) -> Result<Arc<RecordTable>> {
        self.store.path_for(filename)?;
        self.cache.get_or_load(filename, || {
            if !self.store.contains(filename) {
                return Err(PressError::InvalidRequest(format!(
                    "no upload named {filename:?}"
                )));
            }
            let table = read_validated_csv(&self.store.read(filename)?)?;
            info!(filename, rows = table.len(), "upload loaded from disk");
            Ok(table)
        })
    }

    /// Session detail of one press of a stored upload.
    pub fn press_detail(&self, query: &PressQuery) -> Result<AnalysisView> {
        let table = self.table(&query.filename)?;
        analysis::press_detail(&table, &query.filename, &query.sn)
    }

    /// Rows of one session of one press of a stored upload.
    pub fn session(&self, filename: &str, sn: &str, start_time: &str) -> Result<RecordTable> {
        let table = self.table(filename)?;
        analysis::session_table(&table, sn, start_time)
    }

    /// Plot data over client-supplied session rows.
    pub fn plot_data(&self, request: PlotRequest) -> Result<PlotDataView> {
        let session = table_from_json_rows(&request.session_data);
        let options = OutlierOptions {
            enabled: request.remove_outliers,
            level: request.outlier_level,
        };
        debug!(
            rows = session.len(),
            remove_outliers = options.enabled,
            level = options.level,
            "building plot data"
        );
        Ok(analysis::plot_data(session, options))
    }

    /// Plot data for a stored session.
    pub fn session_plot_data(
        &self,
        filename: &str,
        sn: &str,
        start_time: &str,
        options: OutlierOptions,
    ) -> Result<PlotDataView> {
        let session = self.session(filename, sn, start_time)?;
        Ok(analysis::plot_data(session, options))
    }

    /// Status label frequencies over client-supplied session rows.
    pub fn error_stats(&self, request: ErrorStatsRequest) -> Result<ErrorStatsView> {
        let session = table_from_json_rows(&request.session_data);
        analysis::error_stats(&session)
    }

    /// Status label frequencies for a stored session.
    pub fn session_error_stats(
        &self,
        filename: &str,
        sn: &str,
        start_time: &str,
    ) -> Result<ErrorStatsView> {
        let session = self.session(filename, sn, start_time)?;
        analysis::error_stats(&session)
    }

    /// Run a JSON request body of the given kind and build its response.
    pub fn handle(&self, kind: RequestKind, body: &str) -> ServiceResponse<Value> {
        debug!(?kind, bytes = body.len(), "handling request");
        match kind {
            RequestKind::Press => ServiceResponse::respond(
                parse_request::<PressQuery>(body).and_then(|q| self.press_detail(&q)),
            ),
            RequestKind::Plot => ServiceResponse::respond(
                parse_request::<PlotRequest>(body).and_then(|r| self.plot_data(r)),
            ),
            RequestKind::Errors => ServiceResponse::respond(
                parse_request::<ErrorStatsRequest>(body).and_then(|r| self.error_stats(r)),
            ),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const HEADER: &str = "sn,calibrationname,substratename,statusforhistory,scalingstatus,gapstatus,imagescalingusedupm,blanketid,calibrationid,gaperrorfinalum,imagescalingerrorupm,starttime";

    fn csv(rows: &[&str]) -> String {
        let mut out = HEADER.to_string();
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    fn single_press() -> String {
        csv(&[
            "007,c,s,status=Succeeded,status=Succeeded,status=Failed (gap drift),1.0,1,10,2,1,2024-01-01 10:00:00.100",
            "007,c,s,status=Succeeded,status=Failed (x) (too wide),status=Succeeded,1.0,2,10,2,3,2024-01-01 10:00:00.900",
            "007,c,s,status=Failed,status=Succeeded,status=Succeeded,1.0,1,11,2,5,2024-01-02 09:00:00",
        ])
    }

    fn multi_press() -> String {
        csv(&[
            "1,c,s,status=Succeeded,status=Succeeded,status=Succeeded,1,5,100,1,1,a",
            "2,c,s,status=Failed,status=Succeeded,status=Failed,1,3,200,1,1,b",
        ])
    }

    fn service() -> (PressService, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let service = PressService::open(dir.path().join("uploads")).expect("open service");
        (service, dir)
    }

    // ── upload ────────────────────────────────────────────────────────────────

    #[test]
    fn test_upload_single_press_returns_detail() {
        let (service, _dir) = service();
        let view = service.upload("one.csv", single_press().as_bytes()).unwrap();
        match view {
            AnalysisView::SinglePress(detail) => {
                assert_eq!(detail.sn, "007");
                assert_eq!(detail.start_times.len(), 2);
            }
            other => panic!("expected single press, got {other:?}"),
        }
        assert_eq!(service.store().list(), vec!["one.csv".to_string()]);
        assert_eq!(service.cache().len(), 1);
    }

    #[test]
    fn test_upload_multi_press_returns_summary() {
        let (service, _dir) = service();
        let view = service.upload("many.csv", multi_press().as_bytes()).unwrap();
        assert!(matches!(view, AnalysisView::MultiPress(ref m) if m.summary.len() == 2));
    }

    #[test]
    fn test_rejected_upload_is_not_stored() {
        let (service, _dir) = service();
        let err = service.upload("bad.csv", b"sn,blanketid\n1,2\n").unwrap_err();
        assert_eq!(err.to_string(), "Required column \"calibrationname\" is missing.");
        assert!(service.store().list().is_empty());
        assert!(service.cache().is_empty());
    }

    #[test]
    fn test_upload_rejects_unsafe_name() {
        let (service, _dir) = service();
        let err = service.upload("../x.csv", multi_press().as_bytes()).unwrap_err();
        assert!(matches!(err, PressError::InvalidFilename(_)));
    }

    #[test]
    fn test_reupload_replaces_cached_table() {
        let (service, _dir) = service();
        service.upload("f.csv", multi_press().as_bytes()).unwrap();
        service.upload("f.csv", single_press().as_bytes()).unwrap();
        assert_eq!(service.table("f.csv").unwrap().len(), 3);
    }

    // ── press_detail ──────────────────────────────────────────────────────────

    #[test]
    fn test_press_detail_matches_single_press_upload() {
        let (service, _dir) = service();
        let uploaded = service.upload("one.csv", single_press().as_bytes()).unwrap();
        let queried = service
            .press_detail(&PressQuery {
                filename: "one.csv".into(),
                sn: "007".into(),
            })
            .unwrap();
        assert_eq!(uploaded, queried);
    }

    #[test]
    fn test_press_detail_loads_from_disk_when_not_cached() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("uploads");
        {
            let first = PressService::open(&root).unwrap();
            first.upload("many.csv", multi_press().as_bytes()).unwrap();
        }
        let second = PressService::open(&root).unwrap();
        assert!(second.cache().is_empty());
        let view = second
            .press_detail(&PressQuery {
                filename: "many.csv".into(),
                sn: "2".into(),
            })
            .unwrap();
        assert!(matches!(view, AnalysisView::SinglePress(ref d) if d.sn == "2"));
        assert_eq!(second.cache().len(), 1);
    }

    #[test]
    fn test_press_detail_unknown_serial_is_validation_error() {
        let (service, _dir) = service();
        service.upload("many.csv", multi_press().as_bytes()).unwrap();
        let err = service
            .press_detail(&PressQuery {
                filename: "many.csv".into(),
                sn: "9".into(),
            })
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_press_detail_unknown_file() {
        let (service, _dir) = service();
        let err = service
            .press_detail(&PressQuery {
                filename: "absent.csv".into(),
                sn: "1".into(),
            })
            .unwrap_err();
        assert!(matches!(err, PressError::InvalidRequest(_)));
        assert!(service.cache().is_empty());
    }

    // ── stored sessions ───────────────────────────────────────────────────────

    #[test]
    fn test_session_by_fractional_time() {
        let (service, _dir) = service();
        service.upload("one.csv", single_press().as_bytes()).unwrap();
        let session = service
            .session("one.csv", "007", "2024-01-01 10:00:00.555")
            .unwrap();
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn test_session_error_stats() {
        let (service, _dir) = service();
        service.upload("one.csv", single_press().as_bytes()).unwrap();
        let stats = service
            .session_error_stats("one.csv", "007", "2024-01-01 10:00:00")
            .unwrap();
        assert_eq!(stats.scaling_stats.get("Succeeded"), 1);
        assert_eq!(stats.scaling_stats.get("too wide"), 1);
        assert_eq!(stats.gap_stats.get("gap drift"), 1);
    }

    #[test]
    fn test_session_plot_data_std_dev() {
        let (service, _dir) = service();
        service.upload("one.csv", single_press().as_bytes()).unwrap();
        let plot = service
            .session_plot_data(
                "one.csv",
                "007",
                "2024-01-01 10:00:00",
                OutlierOptions::default(),
            )
            .unwrap();
        // scaling errors 1 and 3: sample std dev sqrt(2)
        assert_eq!(plot.scaling_std_dev, Some(1.41));
        assert_eq!(plot.gap_std_dev, Some(0.0));
    }

    // ── request parsing ───────────────────────────────────────────────────────

    #[test]
    fn test_plot_request_defaults() {
        let req: PlotRequest = serde_json::from_str(r#"{"sessionData": []}"#).unwrap();
        assert!(!req.remove_outliers);
        assert_eq!(req.outlier_level, 1);
    }

    #[test]
    fn test_plot_request_level_forms() {
        for (raw, expected) in [("2", 2), ("\"3\"", 3), ("2.0", 2), ("-1", -1), ("\" 4 \"", 4)] {
            let body = format!(r#"{{"sessionData": [], "outlierLevel": {raw}}}"#);
            let req: PlotRequest = serde_json::from_str(&body).unwrap();
            assert_eq!(req.outlier_level, expected, "outlierLevel {raw}");
        }
    }

    #[test]
    fn test_plot_request_rejects_bad_level() {
        for raw in ["\"high\"", "null", "true", "99999999999"] {
            let body = format!(r#"{{"sessionData": [], "outlierLevel": {raw}}}"#);
            assert!(serde_json::from_str::<PlotRequest>(&body).is_err(), "{raw}");
        }
    }

    #[test]
    fn test_press_query_numeric_serial() {
        let q: PressQuery = serde_json::from_str(r#"{"filename": "a.csv", "sn": 7}"#).unwrap();
        assert_eq!(q.sn, "7");
        let q: PressQuery = serde_json::from_str(r#"{"filename": "a.csv", "sn": "007"}"#).unwrap();
        assert_eq!(q.sn, "007");
    }

    // ── handle / responses ────────────────────────────────────────────────────

    #[test]
    fn test_handle_plot_with_outlier_removal() {
        let (service, _dir) = service();
        let body = json!({
            "sessionData": [
                {"sn": "1", "gaperrorfinalum": 1, "imagescalingerrorupm": 1.5},
                {"sn": "1", "gaperrorfinalum": 1, "imagescalingerrorupm": 2.5},
                {"sn": "1", "gaperrorfinalum": 1000, "imagescalingerrorupm": 1.5},
                {"sn": "1", "gaperrorfinalum": 1, "imagescalingerrorupm": 2.5},
                {"sn": "1", "gaperrorfinalum": 1, "imagescalingerrorupm": 1.5}
            ],
            "removeOutliers": true,
            "outlierLevel": "1"
        })
        .to_string();
        let response = service.handle(RequestKind::Plot, &body);
        let ServiceResponse::Ok(value) = response else {
            panic!("expected success, got {response:?}");
        };
        let gaps: Vec<&Value> = value["plotData"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| &row["gaperrorfinalum"])
            .collect();
        assert!(gaps.iter().all(|g| **g == json!(1)));
        assert_eq!(value["gapStdDev"], json!(0));
        assert_eq!(value["scalingStdDev"], json!(0.55));
        assert_eq!(value["plotData"][0]["sn"], json!("1"));
    }

    #[test]
    fn test_handle_error_stats_preserves_first_seen_order() {
        let (service, _dir) = service();
        let body = json!({
            "sessionData": [
                {"scalingstatus": "status=Failed (b)", "gapstatus": null},
                {"scalingstatus": "status=Succeeded", "gapstatus": "status=Aborted"},
                {"scalingstatus": "status=Failed (b)", "gapstatus": 5}
            ]
        })
        .to_string();
        let ServiceResponse::Ok(value) = service.handle(RequestKind::Errors, &body) else {
            panic!("expected success");
        };
        assert_eq!(
            serde_json::to_string(&value["scalingStats"]).unwrap(),
            r#"{"b":2,"Succeeded":1}"#
        );
        assert_eq!(
            serde_json::to_string(&value["gapStats"]).unwrap(),
            r#"{"Not Available":1,"Aborted (No message)":1,"Parsing Error":1}"#
        );
    }

    #[test]
    fn test_handle_malformed_body_is_validation_error() {
        let (service, _dir) = service();
        let response = service.handle(RequestKind::Errors, "{not json");
        let body = response.error().unwrap();
        assert_eq!(body.kind, ErrorKind::Validation);
        assert!(body.error.starts_with("Invalid request:"));

        let response = service.handle(RequestKind::Plot, r#"{"removeOutliers": true}"#);
        assert_eq!(response.error().unwrap().kind, ErrorKind::Validation);
    }

    #[test]
    fn test_handle_press_wire_shape() {
        let (service, _dir) = service();
        service.upload("one.csv", single_press().as_bytes()).unwrap();
        let response = service.handle(RequestKind::Press, r#"{"filename": "one.csv", "sn": "007"}"#);
        let ServiceResponse::Ok(value) = response else {
            panic!("expected success");
        };
        assert_eq!(value["view"], json!("single_press"));
        assert_eq!(value["startTimes"][0]["short_time"], json!("2024-01-01 10:00:00"));
        // 1.0 in the CSV leaves the boundary as an integer.
        assert_eq!(
            value["sessions"]["2024-01-01 10:00:00"][0]["imagescalingusedupm"],
            json!(1)
        );
    }

    #[test]
    fn test_internal_errors_are_generic() {
        let result: Result<Value> = Err(PressError::Io(std::io::Error::other("disk on fire")));
        let response = ServiceResponse::respond(result);
        assert_eq!(
            response.error().unwrap(),
            &ErrorBody {
                error: INTERNAL_ERROR_MESSAGE.to_string(),
                kind: ErrorKind::Internal,
            }
        );
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"error":"Internal server error","kind":"internal"}"#
        );
    }

    #[test]
    fn test_validation_errors_keep_message() {
        let result: Result<Value> = Err(PressError::MissingColumn("sn".into()));
        let response = ServiceResponse::respond(result);
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"error":"Required column \"sn\" is missing.","kind":"validation"}"#
        );
    }
}
