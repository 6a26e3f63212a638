//! Lifecycle operations for openings, applications, candidacies and interviews.
//!
//! Every operation runs in one [`UnitOfWork`](crate::outbox::UnitOfWork): the
//! guard, the dependent writes and the emails commit together or not at all,
//! under the deadline carried by [`Store`].

pub mod applications;
pub mod candidacies;
pub mod guard;
pub mod interviews;
pub mod model;
pub mod notices;
pub mod openings;
pub mod stakeholders;
pub mod states;
pub mod watchers;

use crate::db::Store;

pub use applications::ApplicationsRepo;
pub use candidacies::CandidaciesRepo;
pub use interviews::InterviewsRepo;
pub use model::{HubUserActor, OrgUserActor};
pub use notices::Notices;
pub use openings::OpeningsRepo;
pub use watchers::WatchersRepo;

#[derive(Clone)]
pub struct Hiring {
    pub openings: OpeningsRepo,
    pub watchers: WatchersRepo,
    pub applications: ApplicationsRepo,
    pub candidacies: CandidaciesRepo,
    pub interviews: InterviewsRepo,
}

impl Hiring {
    pub fn new(store: Store, notices: Notices) -> Self {
        Self {
            openings: OpeningsRepo::new(store.clone()),
            watchers: WatchersRepo::new(store.clone()),
            applications: ApplicationsRepo::new(store.clone(), notices.clone()),
            candidacies: CandidaciesRepo::new(store.clone(), notices.clone()),
            interviews: InterviewsRepo::new(store, notices),
        }
    }
}
