//! Group handlers: creation, membership queries, admin-gated membership changes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::plog;
use crate::storage::{new_object_id, now_secs, GroupMemberRow, GroupRow};
use crate::web::auth::Actor;
use crate::web::state::SharedState;
use crate::web::utils::api_error;

#[derive(Deserialize)]
pub struct CreateGroupPayload {
    name: String,
    #[serde(default)]
    member_ids: Vec<String>,
}

pub async fn create_group_handler(
    State(state): State<SharedState>,
    actor: Actor,
    axum::Json(req): axum::Json<CreateGroupPayload>,
) -> Response {
    let name = req.name.trim();
    if name.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "group name is required");
    }

    let st = state.lock().await;
    let now = now_secs();
    let group_id = new_object_id();

    // Creator is the sole admin; every listed member must exist or the
    // whole request is rejected.
    let mut members = vec![GroupMemberRow {
        group_id: group_id.clone(),
        user_id: actor.0.clone(),
        is_admin: true,
        joined_at: now,
    }];
    for member_id in &req.member_ids {
        if *member_id == actor.0 || members.iter().any(|m| m.user_id == *member_id) {
            continue;
        }
        match st.storage.user_exists(member_id) {
            Ok(true) => members.push(GroupMemberRow {
                group_id: group_id.clone(),
                user_id: member_id.clone(),
                is_admin: false,
                joined_at: now,
            }),
            Ok(false) => {
                return api_error(
                    StatusCode::NOT_FOUND,
                    &format!("user not found: {member_id}"),
                );
            }
            Err(e) => {
                plog!("create group lookup failed: {}", e);
                return api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
            }
        }
    }

    let group = GroupRow {
        group_id,
        name: name.to_string(),
        created_by: actor.0.clone(),
        created_at: now,
    };
    if let Err(e) = st.storage.insert_group_with_members(&group, &members) {
        plog!("create group failed: {}", e);
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
    }

    plog!(
        "group {} created by {} with {} members",
        crate::logging::group_id(&group.group_id),
        crate::logging::user_id(&actor.0),
        members.len()
    );

    (StatusCode::CREATED, axum::Json(group_json(&st.storage, &group))).into_response()
}

pub async fn get_group_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(group_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    let group = match st.storage.get_group(&group_id) {
        Ok(Some(g)) => g,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "group not found"),
        Err(e) => {
            plog!("get group failed: {}", e);
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
        }
    };
    match st.storage.is_group_member(&group_id, &actor.0) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::FORBIDDEN, "not a group member"),
        Err(e) => {
            plog!("get group membership check failed: {}", e);
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
        }
    }
    (StatusCode::OK, axum::Json(group_json(&st.storage, &group))).into_response()
}

#[derive(Deserialize)]
pub struct AddMemberPayload {
    user_id: String,
}

pub async fn add_member_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(group_id): Path<String>,
    axum::Json(req): axum::Json<AddMemberPayload>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_group(&group_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "group not found"),
        Err(e) => {
            plog!("add member group lookup failed: {}", e);
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
        }
    }
    match st.storage.is_group_admin(&group_id, &actor.0) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::FORBIDDEN, "admin access required"),
        Err(e) => {
            plog!("add member admin check failed: {}", e);
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
        }
    }
    match st.storage.user_exists(&req.user_id) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => {
            plog!("add member user lookup failed: {}", e);
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
        }
    }
    match st.storage.is_group_member(&group_id, &req.user_id) {
        Ok(true) => return api_error(StatusCode::CONFLICT, "already a member"),
        Ok(false) => {}
        Err(e) => {
            plog!("add member membership check failed: {}", e);
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
        }
    }
    let row = GroupMemberRow {
        group_id: group_id.clone(),
        user_id: req.user_id.clone(),
        is_admin: false,
        joined_at: now_secs(),
    };
    if let Err(e) = st.storage.add_group_member(&row) {
        plog!("add member failed: {}", e);
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
    }
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "added", "user_id": req.user_id })),
    )
        .into_response()
}

pub async fn remove_member_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path((group_id, user_id)): Path<(String, String)>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_group(&group_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "group not found"),
        Err(e) => {
            plog!("remove member group lookup failed: {}", e);
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
        }
    }
    // Members may remove themselves; anyone else requires admin.
    if user_id != actor.0 {
        match st.storage.is_group_admin(&group_id, &actor.0) {
            Ok(true) => {}
            Ok(false) => return api_error(StatusCode::FORBIDDEN, "admin access required"),
            Err(e) => {
                plog!("remove member admin check failed: {}", e);
                return api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure");
            }
        }
    }
    match st.storage.remove_group_member(&group_id, &user_id) {
        Ok(true) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": "removed", "user_id": user_id })),
        )
            .into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "not a group member"),
        Err(e) => {
            plog!("remove member failed: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
        }
    }
}

fn group_json(storage: &crate::storage::Storage, group: &GroupRow) -> serde_json::Value {
    let members = storage.list_group_members(&group.group_id).unwrap_or_default();
    serde_json::json!({
        "group_id": group.group_id,
        "name": group.name,
        "created_by": group.created_by,
        "created_at": group.created_at,
        "members": members,
    })
}
