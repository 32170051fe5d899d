use std::sync::Arc;

use tracing::debug;

use crate::{
    entities::{
        dto::{Page, PageRequest},
        repo::{Entity, RepoError, Repository},
        repo_types::{Licenta, ProfesorInfo},
    },
    state::AppState,
};

/// Save / list / get / delete over one entity repository.
pub struct CrudService<E> {
    repo: Arc<dyn Repository<E>>,
}

impl<E> Clone for CrudService<E> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<E: Entity> CrudService<E> {
    pub fn new(repo: Arc<dyn Repository<E>>) -> Self {
        Self { repo }
    }

    pub async fn save(&self, entity: E) -> Result<E, RepoError> {
        debug!(entity = ?entity, "request to save {}", E::NAME);
        self.repo.save(entity).await
    }

    pub async fn find_all(&self, page: PageRequest) -> anyhow::Result<Page<E>> {
        debug!(page = page.page, size = page.size, "request to get all {}", E::NAME);
        self.repo.find_all(page).await
    }

    pub async fn find_one(&self, id: i64) -> anyhow::Result<Option<E>> {
        debug!(id, "request to get {}", E::NAME);
        self.repo.find_by_id(id).await
    }

    pub async fn find_one_by_owner(&self, owner_id: i64) -> anyhow::Result<Option<E>> {
        debug!(owner_id, "request to get {} by owner", E::NAME);
        self.repo.find_by_owner(owner_id).await
    }

    pub async fn delete(&self, id: i64) -> anyhow::Result<()> {
        debug!(id, "request to delete {}", E::NAME);
        self.repo.delete_by_id(id).await
    }
}

/// Whether the user behind `login` has a student profile with a thesis.
pub async fn has_licenta(st: &AppState, login: &str) -> anyhow::Result<bool> {
    let Some(user) = st.accounts.find_by_login(login).await? else {
        return Ok(false);
    };
    let Some(student) = st.student_infos.find_one_by_owner(user.id).await? else {
        return Ok(false);
    };
    let Some(student_id) = student.id else {
        return Ok(false);
    };
    let licenta: Option<Licenta> = st.licentas.find_one_by_owner(student_id).await?;
    Ok(licenta.is_some())
}

/// Professor profile id of the user behind `login`, or 0 when there is none.
pub async fn profesor_id_of(st: &AppState, login: &str) -> anyhow::Result<i64> {
    let Some(user) = st.accounts.find_by_login(login).await? else {
        return Ok(0);
    };
    let profesor: Option<ProfesorInfo> = st.profesor_infos.find_one_by_owner(user.id).await?;
    Ok(profesor.and_then(|p| p.id).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::{dto::RegisterRequest, repo_types::User},
        entities::{memory::MemoryRepository, repo_types::StudentInfo},
    };

    fn service<E: Entity>() -> CrudService<E> {
        CrudService::new(Arc::new(MemoryRepository::<E>::new()))
    }

    fn student(user_id: i64) -> StudentInfo {
        StudentInfo {
            id: None,
            user_id,
            specialization: Some("Informatica".into()),
            study_year: Some(3),
            group_name: None,
        }
    }

    async fn active_user(st: &AppState, login: &str) -> User {
        let user = st
            .accounts
            .register(RegisterRequest {
                login: login.into(),
                email: format!("{}@uni.ro", login),
                password: "longenough1".into(),
                first_name: None,
                last_name: None,
                lang_key: None,
                image_url: None,
            })
            .await
            .unwrap();
        st.accounts
            .activate(user.state.activation_key().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn crud_roundtrip() {
        let svc = service::<StudentInfo>();
        let saved = svc.save(student(1)).await.unwrap();
        let id = saved.id.expect("id assigned");

        let found = svc.find_one(id).await.unwrap().unwrap();
        assert_eq!(found, saved);

        let mut changed = found.clone();
        changed.study_year = Some(4);
        svc.save(changed).await.unwrap();
        assert_eq!(
            svc.find_one(id).await.unwrap().unwrap().study_year,
            Some(4)
        );

        svc.delete(id).await.unwrap();
        assert!(svc.find_one(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_all_pages_in_id_order() {
        let svc = service::<StudentInfo>();
        for uid in 1..=5 {
            svc.save(student(uid)).await.unwrap();
        }
        let page = svc.find_all(PageRequest { page: 1, size: 2 }).await.unwrap();
        assert_eq!(page.total_elements, 5);
        let owners: Vec<i64> = page.content.iter().map(|s| s.user_id).collect();
        assert_eq!(owners, vec![3, 4]);

        let last = svc.find_all(PageRequest { page: 2, size: 2 }).await.unwrap();
        assert_eq!(last.content.len(), 1);
    }

    #[tokio::test]
    async fn has_licenta_follows_user_student_thesis_chain() {
        let st = AppState::in_memory();
        let user = active_user(&st, "ana").await;
        assert!(!has_licenta(&st, "ana").await.unwrap());
        assert!(!has_licenta(&st, "ghost").await.unwrap());

        let s = st.student_infos.save(student(user.id)).await.unwrap();
        assert!(!has_licenta(&st, "ana").await.unwrap());

        st.licentas
            .save(Licenta {
                id: None,
                student_info_id: s.id.unwrap(),
                profesor_info_id: None,
                title: "Sisteme distribuite".into(),
                description: None,
            })
            .await
            .unwrap();
        assert!(has_licenta(&st, "ana").await.unwrap());
    }

    #[tokio::test]
    async fn profesor_id_defaults_to_zero() {
        let st = AppState::in_memory();
        let user = active_user(&st, "prof").await;
        assert_eq!(profesor_id_of(&st, "prof").await.unwrap(), 0);

        let p = st
            .profesor_infos
            .save(ProfesorInfo {
                id: None,
                user_id: user.id,
                department: Some("Calculatoare".into()),
                academic_title: Some("Conf. dr.".into()),
            })
            .await
            .unwrap();
        assert_eq!(profesor_id_of(&st, "prof").await.unwrap(), p.id.unwrap());
        assert_eq!(profesor_id_of(&st, "ghost").await.unwrap(), 0);
    }
}
