//! Fully-qualified RPC method names. Each one is also the route path.

pub const VALIDATE_USER_SLUG: &str = "/forum.v1.AuthorizationService/ValidateUserSlug";
pub const VALIDATE_USER_NAME: &str = "/forum.v1.AuthorizationService/ValidateUserName";
pub const VALIDATE_USER_EMAIL: &str = "/forum.v1.AuthorizationService/ValidateUserEmail";
pub const REGISTER: &str = "/forum.v1.AuthorizationService/Register";
pub const LOGIN: &str = "/forum.v1.AuthorizationService/Login";
pub const REFRESH_TOKEN: &str = "/forum.v1.AuthorizationService/RefreshToken";
pub const VERIFY_EMAIL: &str = "/forum.v1.AuthorizationService/VerifyEmail";
pub const REQUEST_PASSWORD_RESET: &str = "/forum.v1.AuthorizationService/RequestPasswordReset";
pub const CONFIRM_PASSWORD_RESET: &str = "/forum.v1.AuthorizationService/ConfirmPasswordReset";
pub const LOGOUT: &str = "/forum.v1.AuthorizationService/Logout";
pub const CHANGE_PASSWORD: &str = "/forum.v1.AuthorizationService/ChangePassword";
pub const GET_CURRENT_SESSION: &str = "/forum.v1.AuthorizationService/GetCurrentSession";
pub const LIST_ACTIVE_SESSIONS: &str = "/forum.v1.AuthorizationService/ListActiveSessions";
pub const REVOKE_SESSION: &str = "/forum.v1.AuthorizationService/RevokeSession";

pub const COMMUNITY_GET: &str = "/forum.v1.CommunityService/Get";
pub const COMMUNITY_LIST_COMMUNITIES: &str = "/forum.v1.CommunityService/ListCommunities";

pub const POST_GET: &str = "/forum.v1.PostService/Get";
pub const POST_LIST_COMMUNITY_POSTS: &str = "/forum.v1.PostService/ListCommunityPosts";

pub const COMMENT_LIST: &str = "/forum.v1.CommentService/List";

pub const USER_GET: &str = "/forum.v1.UserService/Get";
pub const USER_GET_STATISTICS: &str = "/forum.v1.UserService/GetStatistics";
pub const USER_LIST_COMMUNITIES: &str = "/forum.v1.UserService/ListCommunities";
pub const USER_LIST_POSTS: &str = "/forum.v1.UserService/ListPosts";
pub const USER_LIST_COMMENTS: &str = "/forum.v1.UserService/ListComments";

pub const HEALTH_CHECK: &str = "/forum.v1.Health/Check";

/// Methods callable without credentials.
///
/// A new public endpoint must be added here explicitly; everything else is
/// authenticated by default.
pub const PUBLIC_METHODS: &[&str] = &[
    VALIDATE_USER_SLUG,
    VALIDATE_USER_NAME,
    VALIDATE_USER_EMAIL,
    REGISTER,
    LOGIN,
    REFRESH_TOKEN,
    VERIFY_EMAIL,
    REQUEST_PASSWORD_RESET,
    CONFIRM_PASSWORD_RESET,
    COMMUNITY_GET,
    COMMUNITY_LIST_COMMUNITIES,
    POST_GET,
    POST_LIST_COMMUNITY_POSTS,
    COMMENT_LIST,
    USER_GET,
    USER_GET_STATISTICS,
    USER_LIST_COMMUNITIES,
    USER_LIST_POSTS,
    USER_LIST_COMMENTS,
    HEALTH_CHECK,
];
