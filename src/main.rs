fn main() {
    std::process::exit(ssh_aws_sso_login::run());
}
