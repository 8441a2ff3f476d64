//! ColorBook: a raster coloring-book core.
//!
//! Line art is loaded as an immutable background; fills and strokes go into a
//! transparent drawing layer that is composited on top.  The GUI (`app`) and
//! the headless CLI (`cli`) both drive a [`session::ColoringSession`].

pub mod logger;

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod io;
pub mod ops;
pub mod session;
pub mod settings;
