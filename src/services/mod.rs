pub mod closure;
pub mod dashboard;
pub mod evaluations;
pub mod invoicing;
pub mod pipeline;
pub mod scope;
