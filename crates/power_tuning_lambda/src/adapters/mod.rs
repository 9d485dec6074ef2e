pub mod aws_lambda;
pub mod function_control;
