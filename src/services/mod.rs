//! Business logic services

pub mod allocator;
pub mod borrows;
pub mod copies;
pub mod policies;
pub mod reconciler;
pub mod reservations;

use crate::repository::Repository;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub policies: policies::PolicyResolver,
    pub allocator: allocator::CopyAllocator,
    pub reservations: reservations::ReservationQueue,
    pub borrows: borrows::BorrowLedger,
    pub copies: copies::CopiesService,
    pub reconciler: reconciler::Reconciler,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository) -> Self {
        let policies = policies::PolicyResolver::new(repository.clone());
        let allocator = allocator::CopyAllocator::new(repository.clone());
        let reservations = reservations::ReservationQueue::new(repository.clone(), policies.clone());

        Self {
            borrows: borrows::BorrowLedger::new(
                repository.clone(),
                policies.clone(),
                allocator.clone(),
                reservations.clone(),
            ),
            copies: copies::CopiesService::new(repository.clone(), reservations.clone()),
            reconciler: reconciler::Reconciler::new(repository, reservations.clone()),
            policies,
            allocator,
            reservations,
        }
    }
}
