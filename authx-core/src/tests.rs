//! 端到端场景：注册、二次登录、密码重置、管理员授权

use tempfile::TempDir;

use crate::*;

fn open(dir: &TempDir) -> Authx {
    let mut config = AuthxConfig::default().with_data_dir(dir.path());
    config.bcrypt_cost = 4;
    Authx::open(&config).unwrap()
}

fn register_req(username: &str, email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.into(),
        email: email.into(),
        password: password.into(),
    }
}

fn other_code(code: &str) -> String {
    if code == "000000" {
        "111111".into()
    } else {
        "000000".into()
    }
}

#[tokio::test]
async fn login_with_password_then_otp() {
    let dir = TempDir::new().unwrap();
    let authx = open(&dir);

    authx
        .auth
        .register(register_req("stud", "stud@x.com", "pw1"))
        .await
        .unwrap();

    let issued = authx
        .auth
        .request_login_otp("stud@x.com", "pw1")
        .await
        .unwrap();
    assert_eq!(issued.email, "stud@x.com");
    assert_eq!(issued.purpose, OtpPurpose::Login);
    assert_eq!(issued.code.len(), OTP_LENGTH);
    assert!(issued.code.chars().all(|c| c.is_ascii_digit()));

    let wrong = other_code(&issued.code);
    assert!(!authx.auth.verify_login("stud@x.com", &wrong).await.unwrap());
    assert!(authx
        .auth
        .verify_login("stud@x.com", &issued.code)
        .await
        .unwrap());
    assert!(!authx
        .auth
        .verify_login("stud@x.com", &issued.code)
        .await
        .unwrap());
}

#[tokio::test]
async fn password_reset_replaces_credential() {
    let dir = TempDir::new().unwrap();
    let authx = open(&dir);

    let err = authx
        .auth
        .request_password_reset("stud@x.com")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserNotFound(_)));

    authx
        .auth
        .register(register_req("stud", "stud@x.com", "pw1"))
        .await
        .unwrap();
    let issued = authx
        .auth
        .request_password_reset("stud@x.com")
        .await
        .unwrap();
    assert_eq!(issued.purpose, OtpPurpose::PasswordReset);

    authx
        .auth
        .confirm_password_reset("stud@x.com", &issued.code, "pw2")
        .await
        .unwrap();

    let err = authx
        .auth
        .request_login_otp("stud@x.com", "pw1")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    authx
        .auth
        .request_login_otp("stud@x.com", "pw2")
        .await
        .unwrap();

    // 验证码只能用一次
    let err = authx
        .auth
        .confirm_password_reset("stud@x.com", &issued.code, "pw3")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidOrExpiredOtp));
}

#[tokio::test]
async fn duplicate_registration_fails() {
    let dir = TempDir::new().unwrap();
    let authx = open(&dir);
    authx
        .auth
        .register(register_req("stud", "stud@x.com", "pw1"))
        .await
        .unwrap();
    let err = authx
        .auth
        .register(register_req("stud2", "stud@x.com", "pw1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DuplicateKey(_)));
    assert_eq!(authx.store.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn super_admin_delegates_to_admin() {
    let dir = TempDir::new().unwrap();
    let authx = open(&dir);
    authx.catalog.seed_defaults().await.unwrap();
    authx
        .catalog
        .ensure_super_admin(&authx.verifier, "root", "root@x.com", "pw1")
        .await
        .unwrap();

    let root = authx.authorities_of("root@x.com").await.unwrap();
    assert!(root.permits(SUPER_ADMIN_ROLE));
    assert!(root.permits(USER_ROLE_UPDATE));

    let boss = authx
        .admin
        .create_admin(
            &root,
            CreateAdminRequest {
                username: "boss".into(),
                email: "boss@x.com".into(),
                password: "pw1".into(),
            },
        )
        .await
        .unwrap();

    // ROLE_ADMIN 可以创建管理员，但不能改角色
    let boss_authorities = authx.authorities_of("boss@x.com").await.unwrap();
    assert!(boss_authorities.permits(ADMIN_CREATE));
    let stud = authx
        .auth
        .register(register_req("stud", "stud@x.com", "pw1"))
        .await
        .unwrap();
    let err = authx
        .admin
        .update_user_roles(
            &boss_authorities,
            &stud.id,
            UpdateUserRolesRequest {
                roles: vec![DEFAULT_ADMIN_ROLE.into()],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Forbidden(_)));

    authx
        .admin
        .update_user_permissions(
            &root,
            &boss.id,
            UpdateUserPermissionsRequest {
                permissions: Some(vec![USER_ROLE_UPDATE.into()]),
            },
        )
        .await
        .unwrap();
    let boss_authorities = authx.authorities_of("boss@x.com").await.unwrap();
    authx
        .admin
        .update_user_roles(
            &boss_authorities,
            &stud.id,
            UpdateUserRolesRequest {
                roles: vec![DEFAULT_ADMIN_ROLE.into()],
            },
        )
        .await
        .unwrap();
    let stud_authorities = authx.authorities_of("stud@x.com").await.unwrap();
    assert!(stud_authorities.permits("STUDENT_READ"));
}

#[tokio::test]
async fn state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let issued = {
        let authx = open(&dir);
        authx
            .auth
            .register(register_req("stud", "stud@x.com", "pw1"))
            .await
            .unwrap();
        authx
            .auth
            .request_login_otp("stud@x.com", "pw1")
            .await
            .unwrap()
    };

    let authx = open(&dir);
    assert!(authx
        .auth
        .verify_login("stud@x.com", &issued.code)
        .await
        .unwrap());
}

#[tokio::test]
async fn ledger_shares_the_store_lock_table() {
    let dir = TempDir::new().unwrap();
    let authx = open(&dir);

    // 经由存储的锁表占住 login 谱系，账本的校验必须等待
    let guard = authx.store.locks().lock("login/stud%40x.com").await;
    let blocked = tokio::time::timeout(
        std::time::Duration::from_millis(100),
        authx.ledger.verify("stud@x.com", "123456", OtpPurpose::Login),
    )
    .await;
    assert!(blocked.is_err());

    drop(guard);
    assert!(!authx
        .ledger
        .verify("stud@x.com", "123456", OtpPurpose::Login)
        .await
        .unwrap());
}

#[tokio::test]
async fn caller_authorities_require_the_password() {
    let dir = TempDir::new().unwrap();
    let authx = open(&dir);
    authx.catalog.seed_defaults().await.unwrap();
    authx
        .catalog
        .ensure_super_admin(&authx.verifier, "root", "root@x.com", "pw1")
        .await
        .unwrap();

    let root = authx
        .authenticated_authorities("root@x.com", "pw1")
        .await
        .unwrap();
    assert!(root.permits(ADMIN_CREATE));
    let err = authx
        .authenticated_authorities("root@x.com", "guess")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}
