pub mod candidate;
pub mod candidate_management;
pub mod candidate_process;
pub mod company;
pub mod management;
pub mod post_sales;
pub mod pre_invoice;
pub mod process;
pub mod user;
