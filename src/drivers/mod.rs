pub mod ltc2944;
pub mod mc3416;
pub mod ms5637;
