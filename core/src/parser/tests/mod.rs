mod annotations;
mod roundtrip;
