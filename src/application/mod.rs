pub mod audit_service;
