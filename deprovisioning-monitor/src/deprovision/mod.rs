/*!
Deprovisioning workflow and its collaborators
*/

pub mod config;
pub mod error;
pub mod identity;
pub mod monitor;
pub mod notifier;
pub mod user;
