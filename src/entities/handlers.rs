use axum::{
    extract::{FromRef, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::{error, instrument, warn};

use crate::{
    account::{jwt::AuthUser, repo_types::Authority},
    entities::{
        dto::PageRequest,
        repo::{Entity, RepoError},
        repo_types::{AplicareLicenta, Licenta, ProfesorInfo, StudentInfo},
        services::{has_licenta, profesor_id_of, CrudService},
    },
    state::AppState,
};

type ApiError = (StatusCode, String);

pub fn entity_routes() -> Router<AppState> {
    Router::new()
        .merge(crud_routes::<StudentInfo>("/student-infos"))
        .merge(crud_routes::<ProfesorInfo>("/profesor-infos"))
        .merge(crud_routes::<Licenta>("/licentas"))
        .merge(crud_routes::<AplicareLicenta>("/aplicare-licentas"))
}

pub fn thesis_routes() -> Router<AppState> {
    Router::new()
        .route("/account/areLicenta/:login", get(are_licenta))
        .route("/account/profesorCurent/:login", get(profesor_curent))
}

fn crud_routes<E>(path: &str) -> Router<AppState>
where
    E: Entity,
    CrudService<E>: FromRef<AppState>,
{
    Router::new()
        .route(path, get(list::<E>).post(create::<E>).put(update::<E>))
        .route(&format!("{}/:id", path), get(get_one::<E>).delete(delete::<E>))
}

fn internal(e: anyhow::Error) -> ApiError {
    error!(error = %e, "entity request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
}

fn save_failed(e: RepoError) -> ApiError {
    match e {
        RepoError::OwnerTaken { .. } => {
            warn!(error = %e, "duplicate owner rejected");
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        RepoError::Backend(e) => internal(e),
    }
}

#[instrument(skip(svc, _user), fields(entity = E::NAME))]
pub async fn list<E: Entity>(
    State(svc): State<CrudService<E>>,
    _user: AuthUser,
    Query(p): Query<PageRequest>,
) -> Result<(HeaderMap, Json<Vec<E>>), ApiError> {
    let page = svc.find_all(p).await.map_err(internal)?;
    let mut headers = HeaderMap::new();
    headers.insert("X-Total-Count", HeaderValue::from(page.total_elements));
    Ok((headers, Json(page.content)))
}

#[instrument(skip(svc, _user, body), fields(entity = E::NAME))]
pub async fn create<E: Entity>(
    State(svc): State<CrudService<E>>,
    _user: AuthUser,
    Json(body): Json<E>,
) -> Result<(StatusCode, Json<E>), ApiError> {
    if body.id().is_some() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("A new {} cannot already have an ID", E::NAME),
        ));
    }
    let saved = svc.save(body).await.map_err(save_failed)?;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[instrument(skip(svc, _user, body), fields(entity = E::NAME))]
pub async fn update<E: Entity>(
    State(svc): State<CrudService<E>>,
    _user: AuthUser,
    Json(body): Json<E>,
) -> Result<Json<E>, ApiError> {
    let Some(id) = body.id() else {
        return Err((StatusCode::BAD_REQUEST, "Invalid id".into()));
    };
    if svc.find_one(id).await.map_err(internal)?.is_none() {
        return Err((StatusCode::NOT_FOUND, format!("{} not found", E::NAME)));
    }
    let saved = svc.save(body).await.map_err(save_failed)?;
    Ok(Json(saved))
}

#[instrument(skip(svc, _user), fields(entity = E::NAME))]
pub async fn get_one<E: Entity>(
    State(svc): State<CrudService<E>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<E>, ApiError> {
    svc.find_one(id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("{} not found", E::NAME)))
}

#[instrument(skip(svc, _user), fields(entity = E::NAME))]
pub async fn delete<E: Entity>(
    State(svc): State<CrudService<E>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    svc.delete(id).await.map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user))]
pub async fn are_licenta(
    State(state): State<AppState>,
    user: AuthUser,
    Path(login): Path<String>,
) -> Result<Json<bool>, ApiError> {
    user.require_any(&[Authority::Admin, Authority::Student])?;
    let found = has_licenta(&state, &login).await.map_err(internal)?;
    Ok(Json(found))
}

/// Always answers for the authenticated professor; the path segment is not
/// consulted.
#[instrument(skip(state, user))]
pub async fn profesor_curent(
    State(state): State<AppState>,
    user: AuthUser,
    Path(_login): Path<String>,
) -> Result<Json<i64>, ApiError> {
    user.require_any(&[Authority::Profesor])?;
    let id = profesor_id_of(&state, &user.0.login)
        .await
        .map_err(internal)?;
    Ok(Json(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::jwt::Principal;

    fn caller(login: &str, authorities: Vec<Authority>) -> AuthUser {
        AuthUser(Principal {
            login: login.into(),
            authorities,
        })
    }

    fn licenta(student_info_id: i64, id: Option<i64>) -> Licenta {
        Licenta {
            id,
            student_info_id,
            profesor_info_id: None,
            title: "Retele neuronale".into(),
            description: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_preset_id_and_update_requires_one() {
        let st = AppState::in_memory();
        let svc = CrudService::<Licenta>::from_ref(&st);

        let err = create(
            State(svc.clone()),
            caller("a", vec![]),
            Json(licenta(1, Some(9))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = update(State(svc.clone()), caller("a", vec![]), Json(licenta(1, None)))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = update(State(svc), caller("a", vec![]), Json(licenta(1, Some(42))))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn second_profile_for_a_user_is_a_bad_request() {
        let st = AppState::in_memory();
        let svc = CrudService::<ProfesorInfo>::from_ref(&st);
        let profile = |id| ProfesorInfo {
            id,
            user_id: 5,
            department: None,
            academic_title: None,
        };
        let (_, Json(first)) = create(State(svc.clone()), caller("a", vec![]), Json(profile(None)))
            .await
            .unwrap();

        let err = create(State(svc.clone()), caller("a", vec![]), Json(profile(None)))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let (_, Json(other)) = create(
            State(svc.clone()),
            caller("a", vec![]),
            Json(ProfesorInfo {
                user_id: 6,
                ..profile(None)
            }),
        )
        .await
        .unwrap();
        let err = update(State(svc.clone()), caller("a", vec![]), Json(profile(other.id)))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let Json(kept) = update(State(svc), caller("a", vec![]), Json(profile(first.id)))
            .await
            .unwrap();
        assert_eq!(kept.id, first.id);
    }

    #[tokio::test]
    async fn list_sets_total_count_header() {
        let st = AppState::in_memory();
        let svc = CrudService::<Licenta>::from_ref(&st);
        for sid in 1..=3 {
            let (status, _) = create(State(svc.clone()), caller("a", vec![]), Json(licenta(sid, None)))
                .await
                .unwrap();
            assert_eq!(status, StatusCode::CREATED);
        }
        let (headers, Json(items)) = list(
            State(svc),
            caller("a", vec![]),
            Query(PageRequest { page: 0, size: 2 }),
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(headers["X-Total-Count"], "3");
    }

    #[tokio::test]
    async fn get_and_delete() {
        let st = AppState::in_memory();
        let svc = CrudService::<Licenta>::from_ref(&st);
        let (_, Json(saved)) = create(State(svc.clone()), caller("a", vec![]), Json(licenta(1, None)))
            .await
            .unwrap();
        let id = saved.id.unwrap();

        let Json(got) = get_one(State(svc.clone()), caller("a", vec![]), Path(id))
            .await
            .unwrap();
        assert_eq!(got, saved);

        let status = delete(State(svc.clone()), caller("a", vec![]), Path(id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let err = get_one(State(svc), caller("a", vec![]), Path(id))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn thesis_lookups_check_authorities() {
        let st = AppState::in_memory();
        let err = are_licenta(
            State(st.clone()),
            caller("p", vec![Authority::Profesor]),
            Path("ana".into()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        let Json(found) = are_licenta(
            State(st.clone()),
            caller("s", vec![Authority::Student]),
            Path("ana".into()),
        )
        .await
        .unwrap();
        assert!(!found);

        let err = profesor_curent(
            State(st.clone()),
            caller("s", vec![Authority::Student]),
            Path("s".into()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        let Json(id) = profesor_curent(
            State(st),
            caller("p", vec![Authority::Profesor]),
            Path("someone-else".into()),
        )
        .await
        .unwrap();
        assert_eq!(id, 0);
    }
}
