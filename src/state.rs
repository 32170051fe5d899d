use crate::account::{
    mail::{LogMailer, MailSender},
    memory::MemoryUserStore,
    repo::{PgUserStore, UserStore},
    services::AccountService,
};
use crate::config::AppConfig;
use crate::entities::{
    memory::MemoryRepository,
    repo::{Entity, PgRepository, Repository},
    repo_types::{AplicareLicenta, Licenta, ProfesorInfo, StudentInfo},
    services::CrudService,
};
use axum::extract::FromRef;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: AccountService,
    pub student_infos: CrudService<StudentInfo>,
    pub profesor_infos: CrudService<ProfesorInfo>,
    pub licentas: CrudService<Licenta>,
    pub aplicari: CrudService<AplicareLicenta>,
}

impl AppState {
    pub fn postgres(db: PgPool, config: AppConfig) -> Self {
        fn repo<E: Entity>(db: &PgPool) -> CrudService<E> {
            CrudService::new(Arc::new(PgRepository::<E>::new(db.clone())) as Arc<dyn Repository<E>>)
        }

        let users = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;
        let mailer = Arc::new(LogMailer::new(config.mail.clone())) as Arc<dyn MailSender>;
        Self {
            accounts: AccountService::new(users, mailer, config.account.clone()),
            student_infos: repo(&db),
            profesor_infos: repo(&db),
            licentas: repo(&db),
            aplicari: repo(&db),
            config: Arc::new(config),
        }
    }

    /// Everything kept in process memory; nothing survives a restart.
    pub fn in_memory_with(config: AppConfig) -> Self {
        fn repo<E: Entity>() -> CrudService<E> {
            CrudService::new(Arc::new(MemoryRepository::<E>::new()) as Arc<dyn Repository<E>>)
        }

        let users = Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>;
        let mailer = Arc::new(LogMailer::new(config.mail.clone())) as Arc<dyn MailSender>;
        Self {
            accounts: AccountService::new(users, mailer, config.account.clone()),
            student_infos: repo(),
            profesor_infos: repo(),
            licentas: repo(),
            aplicari: repo(),
            config: Arc::new(config),
        }
    }

    pub fn in_memory() -> Self {
        Self::in_memory_with(AppConfig::for_tests())
    }
}

impl FromRef<AppState> for CrudService<StudentInfo> {
    fn from_ref(state: &AppState) -> Self {
        state.student_infos.clone()
    }
}

impl FromRef<AppState> for CrudService<ProfesorInfo> {
    fn from_ref(state: &AppState) -> Self {
        state.profesor_infos.clone()
    }
}

impl FromRef<AppState> for CrudService<Licenta> {
    fn from_ref(state: &AppState) -> Self {
        state.licentas.clone()
    }
}

impl FromRef<AppState> for CrudService<AplicareLicenta> {
    fn from_ref(state: &AppState) -> Self {
        state.aplicari.clone()
    }
}
