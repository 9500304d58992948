use common::{SteamId, UserId};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const STEAM_ID_HEADER: &str = "x-steam-id";

/// The authenticated user, as vouched for by the gateway in front of the
/// service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub steam_id: SteamId,
}

fn header<T>(parts: &axum::http::request::Parts, name: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    parts.headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = (axum::http::StatusCode, &'static str);

    async fn from_request_parts(
        req: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user_id = header(req, USER_ID_HEADER)
            .ok_or((axum::http::StatusCode::UNAUTHORIZED, "Not logged in"))?;
        let steam_id = header(req, STEAM_ID_HEADER)
            .ok_or((axum::http::StatusCode::UNAUTHORIZED, "Missing SteamID"))?;

        Ok(Self { user_id, steam_id })
    }
}
