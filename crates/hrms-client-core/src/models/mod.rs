//! Data models for HRMS entities.
//!
//! These are passthrough payloads: the client deserializes what the server
//! sends and performs no business validation.
//!
//! - `User`, `Employee`, `Benefit`: People and their benefits
//! - `Payroll`, `Deduction`, `Tax`: Pay runs
//! - `TimeEntry`, `LeaveRequest`: Time and attendance
//! - `PaginatedResponse`, `QueryParams`: List endpoints

pub mod employee;
pub mod payroll;
pub mod query;
pub mod time;

pub use employee::{Benefit, BenefitType, Employee, EmployeeStatus, User, UserRole};
pub use payroll::{Deduction, DeductionType, Payroll, PayrollStatus, Tax, TaxType};
pub use query::{FilterValue, PaginatedResponse, QueryParams, SortOrder};
pub use time::{LeaveRequest, LeaveStatus, LeaveType, TimeEntry, TimeEntryStatus};
