use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use parley_types::api::{
    AccessChatRequest, AddMemberRequest, AuthResponse, CreateGroupRequest, DeleteMessageResponse,
    EditMessageRequest, ErrorBody, LoginRequest, ReactRequest, RegisterRequest, RenameGroupRequest,
    SendMessageRequest, StarResponse, TogglePinRequest,
};
use parley_types::models::{ChatView, MessageView};

use crate::error::ClientError;

/// REST client for a parley server. Holds the bearer token after
/// `register` or `login`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    // -- Auth --

    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ClientError> {
        let body = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            profile_pic: None,
        };
        let auth: AuthResponse = self.send_json(Method::POST, "/auth/register", &body).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = self.send_json(Method::POST, "/auth/login", &body).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    // -- Chats --

    pub async fn fetch_chats(&self) -> Result<Vec<ChatView>, ClientError> {
        self.call(self.request(Method::GET, "/chats")).await
    }

    pub async fn access_chat(&self, user_id: Uuid) -> Result<ChatView, ClientError> {
        self.send_json(Method::POST, "/chats", &AccessChatRequest { user_id }).await
    }

    pub async fn create_group(&self, name: &str, user_ids: Vec<Uuid>) -> Result<ChatView, ClientError> {
        let body = CreateGroupRequest {
            name: name.to_string(),
            user_ids,
        };
        self.send_json(Method::POST, "/chats/group", &body).await
    }

    pub async fn rename_group(&self, chat_id: Uuid, name: &str) -> Result<ChatView, ClientError> {
        let body = RenameGroupRequest { name: name.to_string() };
        self.send_json(Method::PUT, &format!("/chats/{}/name", chat_id), &body).await
    }

    pub async fn add_to_group(&self, chat_id: Uuid, user_id: Uuid) -> Result<ChatView, ClientError> {
        self.send_json(Method::POST, &format!("/chats/{}/users", chat_id), &AddMemberRequest { user_id })
            .await
    }

    pub async fn remove_from_group(&self, chat_id: Uuid, user_id: Uuid) -> Result<ChatView, ClientError> {
        self.call(self.request(Method::DELETE, &format!("/chats/{}/users/{}", chat_id, user_id)))
            .await
    }

    pub async fn toggle_pin(&self, chat_id: Uuid, message_id: Uuid) -> Result<ChatView, ClientError> {
        self.send_json(Method::PUT, &format!("/chats/{}/pins", chat_id), &TogglePinRequest { message_id })
            .await
    }

    // -- Messages --

    pub async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<MessageView>, ClientError> {
        self.call(self.request(Method::GET, &format!("/chats/{}/messages", chat_id)))
            .await
    }

    pub async fn send_message(
        &self,
        chat_id: Uuid,
        content: &str,
        reply_to_id: Option<Uuid>,
    ) -> Result<MessageView, ClientError> {
        let body = SendMessageRequest {
            chat_id: Some(chat_id),
            content: Some(content.to_string()),
            reply_to_id,
        };
        self.send_json(Method::POST, "/messages", &body).await
    }

    pub async fn edit_message(&self, message_id: Uuid, content: &str) -> Result<MessageView, ClientError> {
        let body = EditMessageRequest { content: content.to_string() };
        self.send_json(Method::PUT, &format!("/messages/{}", message_id), &body).await
    }

    pub async fn delete_message(&self, message_id: Uuid) -> Result<DeleteMessageResponse, ClientError> {
        self.call(self.request(Method::DELETE, &format!("/messages/{}", message_id)))
            .await
    }

    pub async fn react(&self, message_id: Uuid, emoji: &str) -> Result<MessageView, ClientError> {
        let body = ReactRequest { emoji: emoji.to_string() };
        self.send_json(Method::PUT, &format!("/messages/{}/reactions", message_id), &body)
            .await
    }

    pub async fn star(&self, message_id: Uuid) -> Result<StarResponse, ClientError> {
        self.call(self.request(Method::PUT, &format!("/messages/{}/star", message_id)))
            .await
    }

    // -- Plumbing --

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.call(self.request(method, path).json(body)).await
    }

    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.send().await?;
        if resp.status().is_success() {
            return Ok(resp.json().await?);
        }
        Err(error_from(resp).await)
    }
}

async fn error_from(resp: Response) -> ClientError {
    let status = resp.status();
    // Auth endpoints answer with a bare status; everything else has a body.
    let message = resp
        .json::<ErrorBody>()
        .await
        .map(|body| body.message)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").to_string());

    classify(status, message)
}

fn classify(status: StatusCode, message: String) -> ClientError {
    match status {
        StatusCode::BAD_REQUEST => ClientError::Validation(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::FORBIDDEN => ClientError::Forbidden(message),
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::CONFLICT => ClientError::Conflict,
        StatusCode::SERVICE_UNAVAILABLE => ClientError::Unavailable,
        other => ClientError::Status(other.as_u16()),
    }
}
