/*! Whole-program scenarios for the taint analyses.
 *
 * Each scenario builds a small program with the builder API, runs the full pipeline over it and
 * checks the classification reported for individual variables. The programs mirror the C
 * patterns the analysis is meant to handle: straight-line code, guarded updates, loops whose trip
 * count depends on an input, linked structures in arrays, and recursion.
 */

#![allow(unused_imports)]
#![allow(unused_variables)]
#![allow(unused_must_use)]

mod pointer_tests;
mod recursion_tests;
