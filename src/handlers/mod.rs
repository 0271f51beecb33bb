pub mod policy_handler;
