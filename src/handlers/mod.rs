mod admin;
mod auth;
mod health;
mod progress;
mod subjects;
mod users;

pub use admin::{ADMIN_KEY_HEADER, create_admin_user};
pub use auth::{refresh, sign_in, sign_up};
pub use health::health_check;
pub use progress::{mark_section_cleared, section_status, subject_progress, unmark_section_cleared};
pub use subjects::{create_subject, delete_subject, get_subject, list_subjects};
pub use users::current_user;
