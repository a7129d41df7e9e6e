pub mod gate_guard;
