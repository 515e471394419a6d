pub mod auth;
pub mod candidate_managements;
pub mod candidate_processes;
pub mod candidates;
pub mod companies;
pub mod dashboard;
pub mod managements;
pub mod notes;
pub mod post_sales;
pub mod pre_invoice_items;
pub mod pre_invoices;
pub mod processes;
pub mod users;
