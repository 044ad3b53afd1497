pub mod citizenship;
