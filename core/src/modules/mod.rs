pub mod pyfyzz;
