pub mod session;

pub use session::{HttpSession, HttpSessionConfig, HttpSessionFactory};
