mod collection;
mod end_to_end;
mod load_semantics;
