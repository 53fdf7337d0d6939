pub mod tgi;
