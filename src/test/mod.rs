mod cancel;
mod latch;
mod pipe;
