mod check;
mod info;
mod status;

pub use check::run_check;
pub use info::run_render_info;
pub use status::run_status;
