use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::{Extension, Json};

use crate::persistence::{self, PublicUser, UserStore};

use super::auth::{self, Claims};
use super::models::{ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest};
use super::{AppState, fail, ok, ok_message};

const BAD_CREDENTIALS: &str = "invalid username or password";

pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Response {
    let user = match state.store.user_by_username(&request.username).await {
        Ok(Some(user)) => user,
        Ok(None) => return fail(StatusCode::UNAUTHORIZED, BAD_CREDENTIALS),
        Err(err) => {
            log::error!("failed to look up user: {err}");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "login failed");
        }
    };

    match auth::verify_password(&request.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return fail(StatusCode::UNAUTHORIZED, BAD_CREDENTIALS),
        Err(err) => {
            log::error!("password verification failed: {err}");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "login failed");
        }
    }

    match state.auth.issue_token(&user) {
        Ok(token) => ok(LoginResponse {
            token,
            user: user.into(),
        }),
        Err(err) => {
            log::error!("failed to issue token: {err}");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "login failed")
        }
    }
}

/// Creates an account and signs it in.
///
/// The very first account can always be created; afterwards the
/// `disable_registration` setting closes this endpoint.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    if request.username.trim().is_empty() || request.password.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "username and password are required");
    }

    let existing = match state.store.count_users().await {
        Ok(count) => count,
        Err(err) => {
            log::error!("failed to count users: {err}");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "registration failed");
        }
    };
    if existing > 0 && state.settings.disable_registration().await {
        return fail(StatusCode::FORBIDDEN, "registration is disabled");
    }

    let password_hash = match auth::hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            log::error!("failed to hash password: {err}");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "registration failed");
        }
    };

    let user = match state
        .store
        .create_user(request.username.trim(), &password_hash, &request.nickname)
        .await
    {
        Ok(user) => user,
        Err(persistence::Error::DuplicateUser(name)) => {
            return fail(StatusCode::CONFLICT, format!("user `{name}` already exists"));
        }
        Err(err) => {
            log::error!("failed to create user: {err}");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "registration failed");
        }
    };

    match state.auth.issue_token(&user) {
        Ok(token) => ok(LoginResponse {
            token,
            user: user.into(),
        }),
        Err(err) => {
            log::error!("failed to issue token: {err}");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "registration failed")
        }
    }
}

/// Creates an account on behalf of a signed-in user.
///
/// Unlike [`register`] this works while public registration is
/// disabled, since reaching it already required a valid session. No
/// token is issued for the new account.
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    if request.username.trim().is_empty() || request.password.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "username and password are required");
    }

    let password_hash = match auth::hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            log::error!("failed to hash password: {err}");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "failed to create user");
        }
    };

    match state
        .store
        .create_user(request.username.trim(), &password_hash, &request.nickname)
        .await
    {
        Ok(user) => ok(PublicUser::from(user)),
        Err(persistence::Error::DuplicateUser(name)) => {
            fail(StatusCode::CONFLICT, format!("user `{name}` already exists"))
        }
        Err(err) => {
            log::error!("failed to create user: {err}");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "failed to create user")
        }
    }
}

/// The signed-in user's own profile.
pub async fn me(State(state): State<AppState>, Extension(claims): Extension<Claims>) -> Response {
    match state.store.user_by_username(&claims.username).await {
        Ok(Some(user)) => ok(PublicUser::from(user)),
        Ok(None) => fail(StatusCode::NOT_FOUND, "user no longer exists"),
        Err(err) => {
            log::error!("failed to look up user: {err}");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "failed to load profile")
        }
    }
}

pub async fn list_users(State(state): State<AppState>) -> Response {
    match state.store.list_users().await {
        Ok(users) => ok(users.into_iter().map(PublicUser::from).collect::<Vec<_>>()),
        Err(err) => {
            log::error!("failed to list users: {err}");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "failed to list users")
        }
    }
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Response {
    if id == claims.sub {
        return fail(StatusCode::BAD_REQUEST, "cannot delete the signed-in user");
    }
    match state.store.delete_user(id).await {
        Ok(true) => ok_message("user deleted"),
        Ok(false) => fail(StatusCode::NOT_FOUND, "no such user"),
        Err(err) => {
            log::error!("failed to delete user: {err}");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "failed to delete user")
        }
    }
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<ChangePasswordRequest>,
) -> Response {
    if request.new_password.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "new password must not be empty");
    }

    let user = match state.store.user_by_username(&claims.username).await {
        Ok(Some(user)) => user,
        Ok(None) => return fail(StatusCode::NOT_FOUND, "user no longer exists"),
        Err(err) => {
            log::error!("failed to look up user: {err}");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "failed to change password");
        }
    };

    match auth::verify_password(&request.current_password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return fail(StatusCode::UNAUTHORIZED, "current password is wrong"),
        Err(err) => {
            log::error!("password verification failed: {err}");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "failed to change password");
        }
    }

    let password_hash = match auth::hash_password(&request.new_password) {
        Ok(hash) => hash,
        Err(err) => {
            log::error!("failed to hash password: {err}");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "failed to change password");
        }
    };

    match state.store.update_password(user.id, &password_hash).await {
        Ok(()) => ok_message("password changed"),
        Err(err) => {
            log::error!("failed to update password: {err}");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "failed to change password")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(username: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_owned(),
            password: "hunter2".to_owned(),
            nickname: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_user_works_while_registration_disabled() {
        let (state, _tmp) = super::super::test_state().await;

        let first = register(State(state.clone()), Json(account("admin"))).await;
        assert_eq!(first.status(), StatusCode::OK);
        state.settings.set_disable_registration(true).await.unwrap();

        let rejected = register(State(state.clone()), Json(account("guest"))).await;
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

        let created = create_user(State(state.clone()), Json(account("operator"))).await;
        assert_eq!(created.status(), StatusCode::OK);
        assert!(
            state
                .store
                .user_by_username("operator")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicates_and_blank_names() {
        let (state, _tmp) = super::super::test_state().await;

        let first = create_user(State(state.clone()), Json(account("admin"))).await;
        assert_eq!(first.status(), StatusCode::OK);

        let duplicate = create_user(State(state.clone()), Json(account("admin"))).await;
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let blank = create_user(State(state.clone()), Json(account("  "))).await;
        assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
    }
}
