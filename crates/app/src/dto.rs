use serde::{Deserialize, Serialize};

use warden_core::UserPatch;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Partial update; absent fields stay as stored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl EditUserRequest {
    /// Empty strings count as absent, like an omitted form field.
    pub fn normalized(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.is_empty())
        }
        Self {
            username: keep(self.username),
            email: keep(self.email),
            password: keep(self.password),
        }
    }
}

impl From<CreateUserRequest> for EditUserRequest {
    fn from(req: CreateUserRequest) -> Self {
        Self {
            username: Some(req.username),
            email: Some(req.email),
            password: Some(req.password),
        }
    }
}

impl From<EditUserRequest> for UserPatch {
    fn from(req: EditUserRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            password: req.password,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertRoleRequest {
    pub email: String,
    pub role_name: String,
}

// -------------------------
// Response DTOs
// -------------------------

/// `{status, code, data}` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standard<T> {
    pub status: u16,
    pub code: &'static str,
    pub data: Option<T>,
}

impl<T> Standard<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: 200,
            code: "STATUS_OK",
            data: Some(data),
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: 201,
            code: "STATUS_CREATED",
            data: Some(data),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub message: String,
}

/// Acknowledgement with an optional message.
pub type Ack = Standard<Message>;

impl Ack {
    pub fn ack() -> Self {
        Self {
            status: 200,
            code: "STATUS_OK",
            data: None,
        }
    }

    pub fn ack_with(message: impl Into<String>) -> Self {
        Self::ok(Message {
            message: message.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub total_data: u64,
    pub total_page: u64,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
}

/// List envelope with paging metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paginated<T> {
    pub status: u16,
    pub code: &'static str,
    pub data: Vec<T>,
    pub meta: PageMeta,
    pub links: Links,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    /// Epoch milliseconds.
    pub expired_at: i64,
}

/// Login result. The refresh token travels separately (e.g. as a cookie).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub response: Standard<AccessToken>,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn list_envelope_shape() {
        let page = Paginated::<u8> {
            status: 200,
            code: "STATUS_OK",
            data: vec![],
            meta: PageMeta {
                total_data: 11,
                total_page: 2,
                size: 10,
            },
            links: Links {
                self_link: "?size=10".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            json!({
                "status": 200,
                "code": "STATUS_OK",
                "data": [],
                "meta": {"total_data": 11, "total_page": 2, "size": 10},
                "links": {"self": "?size=10"}
            })
        );
    }

    #[test]
    fn edit_request_drops_empty_fields() {
        let req = EditUserRequest {
            username: Some(String::new()),
            email: Some("a@b.co".into()),
            password: None,
        }
        .normalized();
        assert_eq!(req.username, None);
        assert_eq!(req.email.as_deref(), Some("a@b.co"));
    }

    #[test]
    fn ack_has_null_data() {
        assert_eq!(
            serde_json::to_value(Ack::ack()).unwrap(),
            json!({"status": 200, "code": "STATUS_OK", "data": null})
        );
    }
}
