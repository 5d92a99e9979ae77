pub mod element;
pub mod matching;
pub mod recommendation;
pub mod run;
pub mod scoring;
