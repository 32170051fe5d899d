use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;

use crate::entities::{
    dto::{Page, PageRequest},
    repo::{Entity, RepoError, Repository},
};

/// Repository kept in process memory, ordered by id.
pub struct MemoryRepository<E> {
    inner: Mutex<Rows<E>>,
}

struct Rows<E> {
    next_id: i64,
    rows: BTreeMap<i64, E>,
}

impl<E> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Rows {
                next_id: 0,
                rows: BTreeMap::new(),
            }),
        }
    }
}

impl<E> MemoryRepository<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Rows<E>>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("repository lock poisoned"))
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryRepository<E> {
    async fn save(&self, entity: E) -> Result<E, RepoError> {
        let mut inner = self.lock()?;
        if E::OWNER_UNIQUE.is_some() {
            let owner_id = entity.owner_id();
            let taken = inner
                .rows
                .values()
                .any(|e| e.owner_id() == owner_id && e.id() != entity.id());
            if taken {
                return Err(RepoError::OwnerTaken {
                    entity: E::NAME,
                    owner_id,
                });
            }
        }
        let (id, entity) = match entity.id() {
            Some(id) => {
                inner.next_id = inner.next_id.max(id);
                (id, entity)
            }
            None => {
                inner.next_id += 1;
                let id = inner.next_id;
                (id, entity.with_id(id))
            }
        };
        inner.rows.insert(id, entity.clone());
        Ok(entity)
    }

    async fn find_all(&self, page: PageRequest) -> anyhow::Result<Page<E>> {
        let inner = self.lock()?;
        let content = inner
            .rows
            .values()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok(Page {
            content,
            total_elements: inner.rows.len() as i64,
            page: page.page,
            size: page.limit(),
        })
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<E>> {
        Ok(self.lock()?.rows.get(&id).cloned())
    }

    async fn find_by_owner(&self, owner_id: i64) -> anyhow::Result<Option<E>> {
        Ok(self
            .lock()?
            .rows
            .values()
            .find(|e| e.owner_id() == owner_id)
            .cloned())
    }

    async fn delete_by_id(&self, id: i64) -> anyhow::Result<()> {
        self.lock()?.rows.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::repo_types::{Licenta, StudentInfo};

    fn student(user_id: i64) -> StudentInfo {
        StudentInfo {
            id: None,
            user_id,
            specialization: None,
            study_year: Some(2),
            group_name: None,
        }
    }

    #[tokio::test]
    async fn one_student_profile_per_user() {
        let repo = MemoryRepository::<StudentInfo>::new();
        let saved = repo.save(student(7)).await.unwrap();

        let err = repo.save(student(7)).await.unwrap_err();
        assert!(matches!(err, RepoError::OwnerTaken { owner_id: 7, .. }));

        // re-saving the same row is not a conflict
        let mut changed = saved.clone();
        changed.study_year = Some(3);
        repo.save(changed).await.unwrap();

        let other = repo.save(student(8)).await.unwrap();
        let err = repo
            .save(StudentInfo {
                user_id: 7,
                ..other
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::OwnerTaken { .. }));
        assert_eq!(repo.find_all(PageRequest::default()).await.unwrap().total_elements, 2);
    }

    #[tokio::test]
    async fn theses_may_share_a_student() {
        let repo = MemoryRepository::<Licenta>::new();
        for title in ["Compilatoare", "Retele"] {
            repo.save(Licenta {
                id: None,
                student_info_id: 1,
                profesor_info_id: None,
                title: title.into(),
                description: None,
            })
            .await
            .unwrap();
        }
    }
}
