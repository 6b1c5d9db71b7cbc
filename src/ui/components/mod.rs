pub mod footer;

pub use footer::draw_footer;
