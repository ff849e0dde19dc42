//! Typed request/response records (`spec.md` §3, §4.2, C2).
//!
//! `spec.md` §9 flags the original "one struct, many optional fields"
//! representation as fragile and asks for a discriminated union per
//! request kind. `Request` below is that union — each variant only
//! carries the fields its kind actually requires, so a handler that
//! pattern-matches on `Request::Post { .. }` gets `msg_type`/`is_group`
//! without an `Option::unwrap`. `Response` is always server-constructed
//! (never parsed off the wire), so it stays a tagged field bag matching
//! the wire shape in `spec.md` §3 directly; the constructor helpers in
//! §4.2 are the only way production code builds one, which rules out
//! the invalid field combinations a bag type would otherwise allow.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: Option<&str>) -> NaiveDateTime {
    raw.and_then(|s| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok())
        .unwrap_or_else(|| chrono::Utc::now().naive_utc())
}

/// The `msg_type` of a Post request/response. `Other` preserves forward
/// compatibility with kinds the preview rule (`spec.md` §4.9) does not
/// special-case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgType {
    Text,
    File,
    Gif,
    Image,
    #[serde(other)]
    Other,
}

impl MsgType {
    fn from_str_lossy(s: &str) -> MsgType {
        match s {
            "text" => MsgType::Text,
            "file" => MsgType::File,
            "gif" => MsgType::Gif,
            "image" => MsgType::Image,
            _ => MsgType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Upload,
    Download,
}

impl FileOperation {
    fn parse(s: &str) -> Result<FileOperation, ProtoError> {
        match s {
            "upload" => Ok(FileOperation::Upload),
            "download" => Ok(FileOperation::Download),
            _ => Err(ProtoError::MalformedFrame(format!(
                "unknown file operation `{s}`"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileOperation::Upload => "upload",
            FileOperation::Download => "download",
        }
    }
}

/// A parsed client request, one variant per `spec.md` §3 `kind`.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Login {
        from_id: i64,
        name: String,
        timestamp: NaiveDateTime,
        user_apn_token: Option<String>,
    },
    Exit {
        from_id: i64,
    },
    Post {
        from_id: i64,
        to_id: i64,
        name: String,
        msg: String,
        msg_type: MsgType,
        is_group: bool,
        timestamp: NaiveDateTime,
    },
    Key,
    QueryUser {
        from_id: i64,
        to_id: i64,
    },
    InsertContact {
        from_id: i64,
        to_id: i64,
    },
    QueryGroup {
        from_id: i64,
        to_id: i64,
        msg: String,
    },
    InsertGroup {
        from_id: i64,
        to_id: i64,
        msg: String,
    },
    InsertGroupUser {
        from_id: i64,
        to_id: i64,
    },
    File {
        from_id: i64,
        file_hash: String,
        file_suffix: String,
        operation: FileOperation,
    },
    ApnsToken {
        from_id: i64,
        apns_token: String,
    },
    UpdateAvatar {
        from_id: i64,
        to_id: i64,
        is_group: bool,
        avatar: String,
    },
}

impl Request {
    pub fn from_id(&self) -> i64 {
        match self {
            Request::Login { from_id, .. }
            | Request::Exit { from_id, .. }
            | Request::Post { from_id, .. }
            | Request::QueryUser { from_id, .. }
            | Request::InsertContact { from_id, .. }
            | Request::QueryGroup { from_id, .. }
            | Request::InsertGroup { from_id, .. }
            | Request::InsertGroupUser { from_id, .. }
            | Request::File { from_id, .. }
            | Request::ApnsToken { from_id, .. }
            | Request::UpdateAvatar { from_id, .. } => *from_id,
            Request::Key => 0,
        }
    }
}

/// Parse one already-extracted, already-decrypted frame's JSON text into a
/// [`Request`] (`spec.md` §4.2).
pub fn parse_request(text: &str) -> Result<Request, ProtoError> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(Value::as_i64)
        .ok_or(ProtoError::MissingField("type"))?;

    let from_id = value.get("from").and_then(Value::as_i64).unwrap_or(0);
    let to_id = value.get("to").and_then(Value::as_i64).unwrap_or(0);
    let msg = value
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let timestamp = parse_timestamp(value.get("timestamp").and_then(Value::as_str));
    let is_group = value
        .get("is_group")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let req = match kind {
        0 => Request::Login {
            from_id,
            name: required_str(&value, "name")?,
            timestamp,
            user_apn_token: value
                .get("user_apn_token")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        1 => Request::Exit { from_id },
        2 => Request::Post {
            from_id,
            to_id,
            name: value.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
            msg: required_str(&value, "msg")?,
            msg_type: MsgType::from_str_lossy(&required_str(&value, "msg_type")?),
            is_group,
            timestamp,
        },
        3 => Request::Key,
        4 => Request::QueryUser { from_id, to_id },
        5 => Request::InsertContact { from_id, to_id },
        6 => Request::QueryGroup { from_id, to_id, msg },
        7 => Request::InsertGroup { from_id, to_id, msg },
        8 => Request::InsertGroupUser { from_id, to_id },
        9 => Request::File {
            from_id,
            file_hash: required_str(&value, "file_hash")?,
            file_suffix: required_str(&value, "file_suffix")?,
            operation: FileOperation::parse(&required_str(&value, "operation")?)?,
        },
        10 => Request::ApnsToken {
            from_id,
            apns_token: required_str(&value, "apns_token")?,
        },
        11 => Request::UpdateAvatar {
            from_id,
            to_id,
            is_group,
            avatar: required_str(&value, "msg")?,
        },
        other => return Err(ProtoError::UnknownKind(other)),
    };

    Ok(req)
}

fn required_str(value: &Value, field: &'static str) -> Result<String, ProtoError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ProtoError::MissingField(field))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Refused = 0,
    Server = 1,
    Post = 2,
    File = 3,
    Warn = 4,
    PubKey = 5,
    UserInfo = 6,
    GroupInfo = 7,
}

/// A server-constructed response. Only ever built through the helpers
/// below, never parsed — see the module doc for why this stays a field
/// bag instead of an enum.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub kind: ResponseKind,
    pub timestamp: NaiveDateTime,
    pub msg: Option<String>,
    pub from_id: Option<i64>,
    pub to_id: Option<i64>,
    pub is_group: Option<bool>,
    pub name: Option<String>,
    pub content: Option<String>,
    pub msg_type: Option<MsgType>,
    pub file_op: Option<FileOperation>,
}

impl Response {
    fn base(kind: ResponseKind) -> Response {
        Response {
            kind,
            timestamp: chrono::Utc::now().naive_utc(),
            msg: None,
            from_id: None,
            to_id: None,
            is_group: None,
            name: None,
            content: None,
            msg_type: None,
            file_op: None,
        }
    }

    pub fn server(msg: impl Into<String>) -> Response {
        Response {
            msg: Some(msg.into()),
            ..Response::base(ResponseKind::Server)
        }
    }

    pub fn refused() -> Response {
        Response::base(ResponseKind::Refused)
    }

    pub fn warn(msg: impl Into<String>) -> Response {
        Response {
            msg: Some(msg.into()),
            ..Response::base(ResponseKind::Warn)
        }
    }

    /// `name_avatar` is the `"name.avatar"` encoding `spec.md` §9 flags as
    /// fragile for v2 but keeps for wire compatibility.
    pub fn user_info(user_id: i64, name_avatar: impl Into<String>) -> Response {
        Response {
            from_id: Some(0),
            to_id: Some(user_id),
            msg: Some(name_avatar.into()),
            ..Response::base(ResponseKind::UserInfo)
        }
    }

    pub fn group_info(group_id: i64, name_avatar: impl Into<String>, during_add: bool) -> Response {
        Response {
            from_id: Some(if during_add { -1 } else { 0 }),
            to_id: Some(group_id),
            msg: Some(name_avatar.into()),
            ..Response::base(ResponseKind::GroupInfo)
        }
    }

    pub fn upload(file_name: impl Into<String>, url: impl Into<String>) -> Response {
        Response {
            msg: Some(file_name.into()),
            content: Some(url.into()),
            file_op: Some(FileOperation::Upload),
            ..Response::base(ResponseKind::File)
        }
    }

    pub fn download(file_name: impl Into<String>, url: impl Into<String>) -> Response {
        Response {
            msg: Some(file_name.into()),
            content: Some(url.into()),
            file_op: Some(FileOperation::Download),
            ..Response::base(ResponseKind::File)
        }
    }

    /// A durable social event (new contact, new group membership). Unlike
    /// the reference implementation's constructor, this performs no
    /// persistence side effect — `spec.md` §9 open question 3 asks for an
    /// explicit `send_hello` dispatcher action instead; the dispatcher
    /// calls the persistence gateway itself before building this value.
    pub fn hello(
        from_user_id: i64,
        to_id: i64,
        from_user_name: impl Into<String>,
        is_group: bool,
        msg: impl Into<String>,
    ) -> Response {
        let name = from_user_name.into();
        Response {
            from_id: Some(from_user_id),
            to_id: Some(to_id),
            is_group: Some(is_group),
            msg: Some(msg.into()),
            name: if name.is_empty() { None } else { Some(name) },
            ..Response::base(ResponseKind::Post)
        }
    }

    /// A plain Post echoed/forwarded/synced verbatim (`spec.md` §4.9, §4.10).
    #[allow(clippy::too_many_arguments)]
    pub fn post(
        from_id: i64,
        to_id: i64,
        timestamp: NaiveDateTime,
        msg: impl Into<String>,
        msg_type: MsgType,
        is_group: bool,
    ) -> Response {
        Response {
            from_id: Some(from_id),
            to_id: Some(to_id),
            timestamp,
            msg: Some(msg.into()),
            msg_type: Some(msg_type),
            is_group: Some(is_group),
            ..Response::base(ResponseKind::Post)
        }
    }

    /// Serialise per the emission rule in `spec.md` §3: `type`/`timestamp`
    /// always present, `msg` present unless `Refused`, everything else
    /// only when set.
    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("type".into(), Value::from(self.kind as i64));
        obj.insert("timestamp".into(), Value::from(format_timestamp(self.timestamp)));

        if self.kind != ResponseKind::Refused {
            obj.insert("msg".into(), Value::from(self.msg.clone().unwrap_or_default()));
        }
        if let Some(from_id) = self.from_id {
            obj.insert("from".into(), Value::from(from_id));
        }
        if let Some(to_id) = self.to_id {
            obj.insert("to".into(), Value::from(to_id));
        }
        if let Some(is_group) = self.is_group {
            obj.insert("is_group".into(), Value::from(is_group));
        }
        if let Some(name) = &self.name {
            obj.insert("name".into(), Value::from(name.clone()));
        }
        if let Some(content) = &self.content {
            obj.insert("content".into(), Value::from(content.clone()));
        }
        if let Some(msg_type) = &self.msg_type {
            obj.insert(
                "msg_type".into(),
                Value::from(serde_json::to_value(msg_type).unwrap().as_str().unwrap().to_string()),
            );
        }
        if let Some(file_op) = self.file_op {
            obj.insert("file_op".into(), Value::from(file_op.as_str()));
        }

        Value::Object(obj)
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_login_with_defaults() {
        let req = parse_request(r#"{"type":0,"from":44248193,"name":"Voltline"}"#).unwrap();
        match req {
            Request::Login { from_id, name, user_apn_token, .. } => {
                assert_eq!(from_id, 44248193);
                assert_eq!(name, "Voltline");
                assert_eq!(user_apn_token, None);
            }
            other => panic!("expected Login, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_field_errors() {
        let err = parse_request(r#"{"type":2,"from":1,"to":2}"#).unwrap_err();
        assert!(matches!(err, ProtoError::MissingField("msg")));
    }

    #[test]
    fn unknown_kind_errors() {
        let err = parse_request(r#"{"type":99}"#).unwrap_err();
        assert!(matches!(err, ProtoError::UnknownKind(99)));
    }

    #[test]
    fn refused_omits_msg() {
        let json = Response::refused().to_json();
        assert!(json.get("msg").is_none());
        assert_eq!(json["type"], 0);
    }

    #[test]
    fn server_message_round_trips() {
        let resp = Response::server("Welcome to Betterfly, Voltline!");
        let json = resp.to_json();
        assert_eq!(json["type"], 1);
        assert_eq!(json["msg"], "Welcome to Betterfly, Voltline!");
        assert!(json.get("from").is_none());
    }

    #[test]
    fn hello_sets_name_only_when_non_empty() {
        let with_name = Response::hello(1001, 1002, "Alice.avatar1", false, "Hello");
        assert_eq!(with_name.to_json()["name"], "Alice.avatar1");

        let without_name = Response::hello(0, 9001, "", true, "Team");
        assert!(without_name.to_json().get("name").is_none());
    }

    #[test]
    fn upload_response_matches_scenario() {
        let resp = Response::upload("abc.png", "https://example.com/presigned");
        let json = resp.to_json();
        assert_eq!(json["type"], 3);
        assert_eq!(json["file_op"], "upload");
        assert_eq!(json["msg"], "abc.png");
        assert_eq!(json["content"], "https://example.com/presigned");
    }
}
