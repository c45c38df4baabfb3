mod permissions;
mod workflows;
